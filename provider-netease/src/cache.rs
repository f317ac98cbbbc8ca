//! In-memory response cache with per-entry TTL.
//!
//! Entries expire lazily: a read past the deadline removes the entry and
//! misses. A background sweeper ([`ResponseCache::spawn_sweeper`]) drops the
//! rest every ten minutes. A TTL of zero means the entry never expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// TTL applied when `set` is called without one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Interval of the background sweep.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Shared key/value cache for decoded API responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            trace!(key, "Cache entry expired");
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store `value`; `ttl` defaults to five minutes, `Duration::ZERO` keeps
    /// the entry forever.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(DEFAULT_TTL);
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.into(), Entry { value, expires_at });
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn flush(&self) {
        self.entries.lock().clear();
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run [`sweep`](Self::sweep) every [`SWEEP_PERIOD`] until aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + SWEEP_PERIOD, SWEEP_PERIOD);
            loop {
                interval.tick().await;
                let removed = cache.sweep();
                trace!(removed, "Response cache swept");
            }
        })
    }
}
