//! # Lyric Cache
//!
//! One JSON file per track id holding the parsed lyric tables and the time
//! they were written. Entries older than seven days are treated as absent
//! and removed on read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::music::LyricData;
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Lyric entries expire after this many milliseconds.
pub const LYRIC_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Serialize, Deserialize)]
struct StoredLyric {
    /// Write time, Unix milliseconds.
    ctime: i64,
    #[serde(flatten)]
    lyric: LyricData,
}

/// File-per-track lyric store with a fixed seven day lifetime.
pub struct LyricCache {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl LyricCache {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached lyric for `key`, or `None` when missing, unreadable or expired.
    pub async fn get(&self, key: &str) -> Option<LyricData> {
        let path = self.dir.join(key);
        let raw = tokio::fs::read(&path).await.ok()?;

        let stored: StoredLyric = match serde_json::from_slice(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key, error = %e, "Unreadable lyric cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        if self.clock.unix_timestamp_millis() - stored.ctime >= LYRIC_TTL_MS {
            debug!(key, "Lyric cache entry expired");
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }

        Some(stored.lyric)
    }

    /// Store `lyric` under `key`, stamped with the current time.
    pub async fn put(&self, key: &str, lyric: &LyricData) -> Result<()> {
        let stored = StoredLyric {
            ctime: self.clock.unix_timestamp_millis(),
            lyric: lyric.clone(),
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(key), serde_json::to_vec(&stored)?).await?;
        Ok(())
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

impl std::fmt::Debug for LyricCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LyricCache").field("dir", &self.dir).finish()
    }
}
