//! # Track Downloads
//!
//! Streams a resolved URL into the temp directory on a background task.
//!
//! ## Pre-buffer gate
//!
//! A load does not wait for the whole file. [`Downloader::fetch`] returns
//! once `prebuffer_bytes` are on disk (or the file finished, if smaller),
//! so a device that streams growing files can start immediately. Devices
//! that need complete files pass `None` and wait for the end. Either way the
//! wait is capped; past the cap the download is abandoned.
//!
//! ```text
//!  fetch() ──spawn──> task: read chunk ─> write ─> flush
//!     │                         │
//!     │<── ready (gate reached) ┘
//!     │                         └─> ... EOF ─> TrackCache::put
//! ```
//!
//! When the download completes the file is offered to the track cache,
//! which admits it only if the server digest matches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::HttpClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cache::TrackCache;
use crate::error::{PlaybackError, Result};

const CHUNK_BYTES: usize = 64 * 1024;

/// Where a completed download should land in the track cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTarget {
    pub key: String,
    pub file_name: String,
    /// Server-declared digest; the cache rejects the file on mismatch.
    pub md5: Option<String>,
}

/// One download job.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub dest: PathBuf,
    /// Bytes to wait for before `fetch` returns; `None` waits for the end.
    pub prebuffer_bytes: Option<u64>,
    pub cache: Option<CacheTarget>,
}

/// Spawns streaming downloads and hands finished files to the track cache.
#[derive(Clone)]
pub struct Downloader {
    http: Arc<dyn HttpClient>,
    track_cache: Arc<TrackCache>,
}

impl Downloader {
    pub fn new(http: Arc<dyn HttpClient>, track_cache: Arc<TrackCache>) -> Self {
        Self { http, track_cache }
    }

    /// Start `request` and wait for its pre-buffer gate, at most `limit`.
    ///
    /// On timeout the background task is aborted and the partial file
    /// removed.
    #[instrument(skip(self, request), fields(dest = %request.dest.display()))]
    pub async fn fetch(&self, request: DownloadRequest, limit: Duration) -> Result<PathBuf> {
        let dest = request.dest.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = self.spawn_with_gate(request, Some(ready_tx));

        match tokio::time::timeout(limit, ready_rx).await {
            Ok(Ok(())) => Ok(dest),
            Ok(Err(_)) => {
                // The task dropped the gate without signalling: it failed.
                match task.await {
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(_)) => Err(PlaybackError::Download(
                        "download ended before the gate".to_string(),
                    )),
                    Err(e) => Err(PlaybackError::Download(e.to_string())),
                }
            }
            Err(_) => {
                warn!(?limit, "Pre-buffer not reached; abandoning download");
                task.abort();
                let _ = tokio::fs::remove_file(&dest).await;
                Err(PlaybackError::PrebufferTimeout(limit))
            }
        }
    }

    /// Start `request` in the background without waiting on it.
    ///
    /// The handle resolves to the number of bytes written.
    pub fn spawn(&self, request: DownloadRequest) -> JoinHandle<Result<u64>> {
        self.spawn_with_gate(request, None)
    }

    fn spawn_with_gate(
        &self,
        request: DownloadRequest,
        gate: Option<oneshot::Sender<()>>,
    ) -> JoinHandle<Result<u64>> {
        let http = self.http.clone();
        let track_cache = self.track_cache.clone();

        tokio::spawn(async move {
            let written = stream_to_file(http.as_ref(), &request, gate).await.map_err(|e| {
                warn!(url = %request.url, error = %e, "Download failed");
                e
            })?;

            if let Some(target) = &request.cache {
                track_cache
                    .put(
                        &target.key,
                        &target.file_name,
                        &request.dest,
                        target.md5.as_deref(),
                    )
                    .await;
            }
            Ok(written)
        })
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("track_cache", &self.track_cache)
            .finish()
    }
}

async fn stream_to_file(
    http: &dyn HttpClient,
    request: &DownloadRequest,
    mut gate: Option<oneshot::Sender<()>>,
) -> Result<u64> {
    let mut reader = http.download_stream(request.url.clone()).await?;

    if let Some(parent) = request.dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&request.dest).await?;

    let mut buf = vec![0u8; CHUNK_BYTES];
    let mut written: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| PlaybackError::Download(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;

        if let Some(threshold) = request.prebuffer_bytes {
            if written >= threshold {
                file.flush().await?;
                signal(&mut gate);
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    signal(&mut gate);

    debug!(written, dest = %request.dest.display(), "Download complete");
    Ok(written)
}

fn signal(gate: &mut Option<oneshot::Sender<()>>) {
    if let Some(tx) = gate.take() {
        let _ = tx.send(());
    }
}

/// Remove regular files in `dir` last modified more than `max_age` before
/// `now`, skipping any whose name is in `keep`. Returns how many were removed.
pub async fn sweep_temp_dir(
    dir: &Path,
    max_age: Duration,
    keep: &[String],
    now: std::time::SystemTime,
) -> Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if keep.contains(&name) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age > max_age {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %name, error = %e, "Failed to remove temp file"),
            }
        }
    }
    Ok(removed)
}
