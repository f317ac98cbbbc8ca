//! # Track Cache
//!
//! Byte-budgeted, least-recently-used store of completed downloads.
//!
//! ## Layout
//!
//! ```text
//! cache/
//! ├── music/            one file per cached track, named "{name}-{id}"
//! └── music-list        JSON index, most recently used first
//! ```
//!
//! The index is the source of truth for recency. On [`TrackCache::init`] it
//! is intersected with the directory listing: entries without a file are
//! dropped and files without an entry are deleted.
//!
//! Every mutation runs under one async mutex, so a `put` racing a `clear`
//! or another `put` for the same key always leaves index and directory in
//! agreement.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use core_runtime::events::{CacheEvent, CacheKind, CoreEvent, EventBus};
use lru::LruCache;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::stats::CacheStats;
use crate::error::{PlaybackError, Result};

/// One entry of the persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexNode {
    pub key: String,
    pub file_name: String,
    pub byte_size: u64,
}

struct IndexState {
    nodes: LruCache<String, IndexNode>,
    total_bytes: u64,
    budget_bytes: u64,
}

impl IndexState {
    fn remove(&mut self, key: &str) -> Option<IndexNode> {
        let node = self.nodes.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(node.byte_size);
        Some(node)
    }

    fn push_front(&mut self, node: IndexNode) {
        self.total_bytes += node.byte_size;
        self.nodes.put(node.key.clone(), node);
    }
}

/// LRU track cache backed by a directory and a JSON index.
pub struct TrackCache {
    dir: PathBuf,
    index_path: PathBuf,
    state: Mutex<IndexState>,
    event_bus: Option<EventBus>,
}

impl TrackCache {
    /// Create an empty cache rooted at `dir` with its index at `index_path`.
    ///
    /// Nothing touches the disk until [`init`](Self::init).
    pub fn new(dir: impl Into<PathBuf>, index_path: impl Into<PathBuf>, budget_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            index_path: index_path.into(),
            state: Mutex::new(IndexState {
                nodes: LruCache::unbounded(),
                total_bytes: 0,
                budget_bytes,
            }),
            event_bus: None,
        }
    }

    /// Set event bus for cache maintenance events.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the index and reconcile it with the directory contents.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut on_disk = HashSet::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                on_disk.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }

        let persisted = self.read_index().await;

        let mut state = self.state.lock().await;
        state.nodes.clear();
        state.total_bytes = 0;

        // The index is most-recent-first; insert from the tail so the head
        // ends up most recent again.
        for node in persisted.into_iter().rev() {
            if on_disk.remove(&node.file_name) {
                if let Some(previous) = state.remove(&node.key) {
                    on_disk.insert(previous.file_name);
                }
                state.push_front(node);
            } else {
                debug!(key = %node.key, "Dropping index entry without file");
            }
        }

        for orphan in on_disk {
            debug!(file = %orphan, "Deleting file without index entry");
            remove_quietly(&self.dir.join(orphan)).await;
        }

        self.evict_to_budget(&mut state).await?;
        self.store_locked(&state).await?;

        info!(
            entries = state.nodes.len(),
            total_bytes = state.total_bytes,
            "Track cache ready"
        );
        Ok(())
    }

    /// Path of the cached file for `key`, promoting it to most recently used.
    pub async fn get(&self, key: &str) -> Option<PathBuf> {
        let mut state = self.state.lock().await;
        let path = self.dir.join(&state.nodes.get(key)?.file_name);

        if tokio::fs::metadata(&path).await.is_ok() {
            Some(path)
        } else {
            warn!(key, "Cached file vanished; dropping entry");
            state.remove(key);
            if let Err(e) = self.store_locked(&state).await {
                warn!(error = %e, "Failed to persist track cache index");
            }
            None
        }
    }

    /// Whether `key` is cached, without touching recency.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.nodes.contains(key)
    }

    /// Copy `source` into the cache under `key`.
    ///
    /// When `expected_md5` is given the source is hashed first and nothing
    /// is written on mismatch. Returns the cached path, or `None` when the
    /// file was rejected or immediately evicted by the budget.
    #[instrument(skip(self, source, expected_md5), fields(key = %key))]
    pub async fn put(
        &self,
        key: &str,
        file_name: &str,
        source: &Path,
        expected_md5: Option<&str>,
    ) -> Option<PathBuf> {
        match self.try_put(key, file_name, source, expected_md5).await {
            Ok(path) => path,
            Err(PlaybackError::Integrity { expected, actual }) => {
                warn!(%expected, %actual, "Refusing to cache track with bad digest");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to cache track");
                None
            }
        }
    }

    async fn try_put(
        &self,
        key: &str,
        file_name: &str,
        source: &Path,
        expected_md5: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        if let Some(expected) = expected_md5.filter(|m| !m.is_empty()) {
            let actual = md5_file(source).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PlaybackError::Integrity {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let mut state = self.state.lock().await;

        if let Some(previous) = state.remove(key) {
            if previous.file_name != file_name {
                remove_quietly(&self.dir.join(&previous.file_name)).await;
            }
        }

        let target = self.dir.join(file_name);
        let byte_size = match tokio::fs::copy(source, &target).await {
            Ok(size) => size,
            Err(e) => {
                remove_quietly(&target).await;
                self.store_locked(&state).await?;
                return Err(e.into());
            }
        };

        state.push_front(IndexNode {
            key: key.to_string(),
            file_name: file_name.to_string(),
            byte_size,
        });
        self.evict_to_budget(&mut state).await?;
        self.store_locked(&state).await?;

        if !state.nodes.contains(key) {
            debug!(byte_size, "Track larger than cache budget");
            return Ok(None);
        }

        debug!(byte_size, total_bytes = state.total_bytes, "Track cached");
        self.emit(CacheEvent::TrackCached {
            key: key.to_string(),
            size: byte_size,
        });
        Ok(Some(target))
    }

    /// Delete every cached file and empty the index.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.clear_locked(&mut state).await?;
        self.store_locked(&state).await?;
        info!("Track cache cleared");
        self.emit(CacheEvent::Cleared {
            kind: CacheKind::Music,
        });
        Ok(())
    }

    /// Change the byte budget, evicting immediately if now over it.
    pub async fn set_budget(&self, budget_bytes: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.budget_bytes = budget_bytes;
        self.evict_to_budget(&mut state).await?;
        self.store_locked(&state).await
    }

    /// Persist the index as it stands.
    pub async fn store(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.store_locked(&state).await
    }

    /// Keys in recency order, most recent first.
    pub async fn keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.nodes.iter().map(|(key, _)| key.clone()).collect()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            total_tracks: state.nodes.len(),
            total_bytes: state.total_bytes,
            budget_bytes: state.budget_bytes,
        }
    }

    // ========================================================================
    // Internals (caller holds the state lock)
    // ========================================================================

    async fn evict_to_budget(&self, state: &mut IndexState) -> Result<()> {
        while state.total_bytes > state.budget_bytes {
            match state.nodes.pop_lru() {
                Some((key, node)) => {
                    state.total_bytes = state.total_bytes.saturating_sub(node.byte_size);
                    remove_quietly(&self.dir.join(&node.file_name)).await;
                    debug!(%key, byte_size = node.byte_size, "Evicted track");
                    self.emit(CacheEvent::TrackEvicted { key });
                }
                None => {
                    warn!(
                        total_bytes = state.total_bytes,
                        "Byte accounting drifted; resetting track cache"
                    );
                    self.clear_locked(state).await?;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn clear_locked(&self, state: &mut IndexState) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        state.nodes.clear();
        state.total_bytes = 0;
        Ok(())
    }

    async fn store_locked(&self, state: &IndexState) -> Result<()> {
        let nodes: Vec<&IndexNode> = state.nodes.iter().map(|(_, node)| node).collect();
        let json = serde_json::to_vec(&nodes)?;
        tokio::fs::write(&self.index_path, json).await.map_err(|e| {
            PlaybackError::Cache(format!(
                "failed to write index {}: {}",
                self.index_path.display(),
                e
            ))
        })
    }

    async fn read_index(&self) -> Vec<IndexNode> {
        let raw = match tokio::fs::read(&self.index_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read track cache index");
                return Vec::new();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Corrupt track cache index; starting empty");
            Vec::new()
        })
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

impl std::fmt::Debug for TrackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackCache")
            .field("dir", &self.dir)
            .field("index_path", &self.index_path)
            .finish()
    }
}

/// Lowercase hex MD5 of a file's contents.
pub async fn md5_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
