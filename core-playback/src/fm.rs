//! # Personal FM
//!
//! A local queue over the remote radio feed. The track handed out by
//! [`PersonalFm::head`] stays at index 0 until the next `head` call, and
//! [`PersonalFm::next`] always reads index 1. On a fresh queue index 0 is
//! the track the next `head` returns, so index 1 is still the one after it.
//! Both refill from the provider when the queue runs short.

use std::collections::VecDeque;
use std::sync::Arc;

use bridge_traits::music::{MusicProvider, TrackItem};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct FmQueue {
    tracks: VecDeque<TrackItem>,
    /// Whether the front track has been handed out as current.
    front_taken: bool,
}

/// Personal radio feed with one-track lookahead.
pub struct PersonalFm {
    provider: Arc<dyn MusicProvider>,
    queue: Mutex<FmQueue>,
}

impl PersonalFm {
    pub fn new(provider: Arc<dyn MusicProvider>) -> Self {
        Self {
            provider,
            queue: Mutex::new(FmQueue::default()),
        }
    }

    /// Advance to the next track and return it as the current one.
    pub async fn head(&self) -> Option<TrackItem> {
        let mut queue = self.queue.lock().await;
        if queue.front_taken {
            queue.tracks.pop_front();
            queue.front_taken = false;
        }
        if queue.tracks.is_empty() {
            self.refill(&mut queue).await;
        }
        let current = queue.tracks.front().cloned();
        queue.front_taken = current.is_some();
        current
    }

    /// The track at index 1, refilling if the queue holds at most one
    /// track.
    pub async fn next(&self) -> Option<TrackItem> {
        let mut queue = self.queue.lock().await;
        if queue.tracks.len() <= 1 {
            self.refill(&mut queue).await;
        }
        queue.tracks.get(1).cloned()
    }

    /// Drop everything queued.
    pub async fn reset(&self) {
        let mut queue = self.queue.lock().await;
        queue.tracks.clear();
        queue.front_taken = false;
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.tracks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.tracks.is_empty()
    }

    async fn refill(&self, queue: &mut FmQueue) {
        match self.provider.personal_fm().await {
            Ok(batch) => {
                debug!(count = batch.len(), "Refilled personal FM");
                queue.tracks.extend(batch);
            }
            Err(e) => warn!(error = %e, "Personal FM refill failed"),
        }
    }
}

impl std::fmt::Debug for PersonalFm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonalFm").finish_non_exhaustive()
    }
}
