//! # Control Messages
//!
//! The message contract between the UI process and the session engine.
//! Each message names one operation; [`CoreService::handle`] dispatches it
//! and answers with a [`ControlReply`].
//!
//! Messages are tagged with `"t"`:
//!
//! ```json
//! { "t": "init", "quality": 320000, "cacheSize": 4294967296, "volume": 60 }
//! { "t": "load", "descriptor": { "kind": "local", "path": "/music/a.flac" } }
//! { "t": "fm_next" }
//! { "t": "queue_delete", "id": "347230-1" }
//! ```
//!
//! The `queue_*` messages are edits made in one UI window. The engine does
//! not keep a queue of its own; it re-emits each edit as a
//! [`QueueEvent`](core_runtime::events::QueueEvent) so every window applies it.
//!
//! [`CoreService::handle`]: crate::CoreService::handle

use std::path::PathBuf;

use bridge_traits::music::TrackItem;
use core_playback::{PlayerSnapshot, TrackDescriptor};
use core_runtime::events::QueueItemId;
use provider_netease::Cookie;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One operation requested by the UI process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Apply the user's quality and cache budget, optionally the volume.
    Init {
        quality: u32,
        #[serde(rename = "cacheSize")]
        cache_size: u64,
        #[serde(default)]
        volume: Option<u8>,
    },
    /// Drop one response-cache entry.
    DeleteCache {
        key: String,
    },
    ClearLyricCache,
    ClearMusicCache,
    /// Save a remote file to a user-chosen path, bypassing the track cache.
    Download {
        url: String,
        path: PathBuf,
    },
    Load {
        descriptor: TrackDescriptor,
    },
    LyricDelay {
        delay_secs: f64,
    },
    Toggle,
    Play,
    Pause,
    Stop,
    Seek {
        offset_secs: f64,
    },
    Speed {
        speed: f32,
    },
    Volume {
        level: u8,
    },
    Fm {
        enabled: bool,
    },
    /// Advance the personal FM feed and start its new head.
    FmNext,
    /// The UI queue changed what plays after the current track.
    QueueChanged {
        next: Option<TrackItem>,
    },
    QueueAdd {
        items: Vec<Value>,
        #[serde(default)]
        index: Option<usize>,
    },
    QueueClear,
    QueueDelete {
        id: QueueItemId,
    },
    QueueNew {
        items: Vec<Value>,
        id: u64,
    },
    QueuePlay {
        id: QueueItemId,
    },
    QueueShift {
        index: i64,
    },
    QueueSort {
        items: Vec<Value>,
    },
    /// Park the queue of a closing window for the next one to pick up.
    Retain {
        items: Vec<Value>,
    },
    /// A UI window attached; answered with whatever was parked.
    Connect,
    RestoreSession {
        cookie: Cookie,
    },
    Logout,
    Status,
}

impl ControlMessage {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::DeleteCache { .. } => "delete_cache",
            Self::ClearLyricCache => "clear_lyric_cache",
            Self::ClearMusicCache => "clear_music_cache",
            Self::Download { .. } => "download",
            Self::Load { .. } => "load",
            Self::LyricDelay { .. } => "lyric_delay",
            Self::Toggle => "toggle",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Seek { .. } => "seek",
            Self::Speed { .. } => "speed",
            Self::Volume { .. } => "volume",
            Self::Fm { .. } => "fm",
            Self::FmNext => "fm_next",
            Self::QueueChanged { .. } => "queue_changed",
            Self::QueueAdd { .. } => "queue_add",
            Self::QueueClear => "queue_clear",
            Self::QueueDelete { .. } => "queue_delete",
            Self::QueueNew { .. } => "queue_new",
            Self::QueuePlay { .. } => "queue_play",
            Self::QueueShift { .. } => "queue_shift",
            Self::QueueSort { .. } => "queue_sort",
            Self::Retain { .. } => "retain",
            Self::Connect => "connect",
            Self::RestoreSession { .. } => "restore_session",
            Self::Logout => "logout",
            Self::Status => "status",
        }
    }
}

/// Answer to a [`ControlMessage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ControlReply {
    Ack,
    /// The track now playing from the FM feed, if the feed had one.
    FmTrack { track: Option<TrackItem> },
    Status { snapshot: PlayerSnapshot },
    /// Queue entries parked by a previous window; empty when none were.
    Retained { items: Vec<Value> },
}
