//! Remote catalogue abstraction and shared track DTOs.
//!
//! The player only needs a handful of remote calls: resolve a playable URL,
//! fetch lyrics, report listening time and pull the personal radio feed.
//! `provider-netease` implements them against the encrypted API; tests use
//! in-memory fakes.

use serde::{Deserialize, Serialize};

use crate::{error::Result, platform::PlatformSendSync};

/// A track as it travels through queues, the FM feed and control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackItem {
    pub id: u64,
    pub name: String,
    /// Declared duration in milliseconds (`dt` on the wire).
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
}

impl TrackItem {
    pub fn new(id: u64, name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            duration_ms,
            artists: Vec::new(),
            album: None,
        }
    }

    /// Track cache lookup key: the decimal id.
    pub fn cache_key(&self) -> String {
        self.id.to_string()
    }

    /// File name of the cached copy, `"{name}-{id}"` with path separators
    /// replaced.
    pub fn cache_file_name(&self) -> String {
        format!("{}-{}", self.name, self.id).replace(['/', '\\'], "_")
    }
}

/// A resolved, time-limited download location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongUrl {
    pub url: String,
    /// Server-declared MD5 of the file, lowercase hex.
    #[serde(default)]
    pub md5: Option<String>,
    /// Container/codec hint such as `mp3` or `flac`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// One timed lyric line; `time` is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub time: f64,
    pub text: String,
}

/// Parsed lyrics for one track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LyricData {
    /// Original lines, sorted by time.
    pub original: Vec<LyricLine>,
    /// Translated lines, sorted by time; may be empty.
    #[serde(default)]
    pub translation: Vec<LyricLine>,
    /// Credited lyric/translation contributors.
    #[serde(rename = "user", default)]
    pub contributors: Vec<String>,
}

impl LyricData {
    /// Text shown for tracks without timed lyrics.
    pub const PLACEHOLDER_TEXT: &'static str = "~";

    /// Single line at time zero, used when no lyric is available.
    pub fn placeholder() -> Self {
        Self {
            original: vec![LyricLine {
                time: 0.0,
                text: Self::PLACEHOLDER_TEXT.to_string(),
            }],
            translation: Vec::new(),
            contributors: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.original.len() == 1
            && self.original[0].time == 0.0
            && self.original[0].text == Self::PLACEHOLDER_TEXT
    }
}

/// Remote catalogue operations the player depends on.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait MusicProvider: PlatformSendSync {
    /// Resolve a download URL at the requested bitrate. `None` when the track
    /// is unavailable or only offered as a trial clip.
    async fn song_url(&self, id: u64, quality: u32) -> Result<Option<SongUrl>>;

    /// Fetch and parse lyrics. Tracks without lyrics yield the placeholder.
    async fn lyric(&self, id: u64) -> Result<LyricData>;

    /// Report `seconds` of listening time for `id`, played from `source_id`.
    async fn scrobble(&self, id: u64, source_id: u64, seconds: u64) -> Result<()>;

    /// Next batch of the personal radio feed.
    async fn personal_fm(&self) -> Result<Vec<TrackItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_item_wire_names() {
        let track: TrackItem = serde_json::from_str(
            r#"{"id":5,"name":"Intro","durationMs":61000,"artists":["A"]}"#,
        )
        .unwrap();
        assert_eq!(track.duration_ms, 61000);
        assert_eq!(track.cache_key(), "5");
        assert_eq!(track.cache_file_name(), "Intro-5");
        assert_eq!(TrackItem::new(6, "A/B", 0).cache_file_name(), "A_B-6");
        assert!(track.album.is_none());
    }

    #[test]
    fn test_placeholder_lyric() {
        let lyric = LyricData::placeholder();
        assert!(lyric.is_placeholder());
        assert!(lyric.translation.is_empty());

        let json = serde_json::to_value(&lyric).unwrap();
        assert_eq!(json["original"][0]["text"], "~");
        assert!(json.get("user").is_some());
    }

    #[test]
    fn test_song_url_type_field() {
        let url: SongUrl =
            serde_json::from_str(r#"{"url":"http://m/x.flac","md5":"ab","type":"flac"}"#)
                .unwrap();
        assert_eq!(url.kind.as_deref(), Some("flac"));
    }
}
