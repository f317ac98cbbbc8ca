//! Wire types for the endpoints this crate calls.
//!
//! Only the fields the engine consumes are modelled; everything else in the
//! envelopes is ignored.

use bridge_traits::music::{SongUrl, TrackItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Song URL
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongUrlItem {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub free_trial_info: Option<Value>,
}

impl SongUrlItem {
    /// Playable, full-length URL; trial clips and empty entries yield `None`.
    pub fn into_song_url(self) -> Option<SongUrl> {
        if self.free_trial_info.as_ref().is_some_and(|v| !v.is_null()) {
            return None;
        }
        let url = self.url.filter(|u| !u.is_empty())?;
        Some(SongUrl {
            url,
            md5: self.md5.map(|m| m.to_ascii_lowercase()),
            kind: self.kind.map(|k| k.to_ascii_lowercase()),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerUrlResponse {
    #[serde(default)]
    pub data: Vec<SongUrlItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadUrlResponse {
    #[serde(default)]
    pub data: Option<SongUrlItem>,
}

// ============================================================================
// Lyric
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricText {
    #[serde(default)]
    pub lyric: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LyricUser {
    pub nickname: String,
    #[serde(default)]
    pub userid: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricResponse {
    #[serde(default)]
    pub lrc: Option<LyricText>,
    #[serde(default)]
    pub tlyric: Option<LyricText>,
    #[serde(default)]
    pub lyric_user: Option<LyricUser>,
    #[serde(default)]
    pub trans_user: Option<LyricUser>,
}

// ============================================================================
// Personal FM
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NamedItem {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Song shape used by the radio endpoint (`duration`, `artists`, `album`).
#[derive(Debug, Clone, Deserialize)]
pub struct RadioSong {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub artists: Vec<NamedItem>,
    #[serde(default)]
    pub album: Option<NamedItem>,
}

impl From<RadioSong> for TrackItem {
    fn from(song: RadioSong) -> Self {
        TrackItem {
            id: song.id,
            name: song.name,
            duration_ms: song.duration,
            artists: song.artists.into_iter().map(|a| a.name).collect(),
            album: song.album.map(|a| a.name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadioResponse {
    #[serde(default)]
    pub data: Vec<RadioSong>,
}

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: u64,
    pub nickname: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub user_id: u64,
}

/// A playlist summary as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub track_count: u64,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub creator: Option<Creator>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlaylistItem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub copywriter: Option<String>,
    #[serde(default)]
    pub track_count: u64,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub user_id: Option<u64>,
}

impl From<RawPlaylistItem> for PlaylistItem {
    fn from(raw: RawPlaylistItem) -> Self {
        let description = raw
            .copywriter
            .filter(|c| !c.is_empty())
            .or(raw.description)
            .unwrap_or_default();
        let creator = raw
            .creator
            .or_else(|| Some(Creator { user_id: raw.user_id.unwrap_or(0) }));
        PlaylistItem {
            id: raw.id,
            name: raw.name,
            description,
            track_count: raw.track_count,
            play_count: raw.play_count,
            creator,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPlaylistResponse {
    #[serde(default)]
    pub playlist: Vec<RawPlaylistItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_trial_rejected() {
        let item: SongUrlItem = serde_json::from_str(
            r#"{"url":"http://m/a.mp3","md5":"AB","type":"MP3","freeTrialInfo":{"start":0,"end":30}}"#,
        )
        .unwrap();
        assert!(item.into_song_url().is_none());

        let item: SongUrlItem = serde_json::from_str(
            r#"{"url":"http://m/a.mp3","md5":"AB","type":"MP3","freeTrialInfo":null}"#,
        )
        .unwrap();
        let url = item.into_song_url().unwrap();
        assert_eq!(url.md5.as_deref(), Some("ab"));
        assert_eq!(url.kind.as_deref(), Some("mp3"));
    }

    #[test]
    fn test_missing_url_rejected() {
        let item: SongUrlItem = serde_json::from_str(r#"{"url":null}"#).unwrap();
        assert!(item.into_song_url().is_none());
    }

    #[test]
    fn test_radio_song_into_track() {
        let song: RadioSong = serde_json::from_str(
            r#"{"id":9,"name":"Song","duration":200000,"artists":[{"id":1,"name":"A"}],"album":{"id":2,"name":"Al"}}"#,
        )
        .unwrap();
        let track = TrackItem::from(song);
        assert_eq!(track.duration_ms, 200000);
        assert_eq!(track.artists, vec!["A"]);
        assert_eq!(track.album.as_deref(), Some("Al"));
    }

    #[test]
    fn test_playlist_resolution() {
        let raw: RawPlaylistItem = serde_json::from_str(
            r#"{"id":1,"name":"Liked","description":"desc","trackCount":3,"playCount":4,"userId":7}"#,
        )
        .unwrap();
        let item = PlaylistItem::from(raw);
        assert_eq!(item.description, "desc");
        assert_eq!(item.creator, Some(Creator { user_id: 7 }));
    }
}
