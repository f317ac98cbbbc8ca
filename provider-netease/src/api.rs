//! Endpoint calls used by the session engine.

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use bridge_traits::music::{LyricData, SongUrl, TrackItem};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::cookie::{Cookie, CookieStore};
use crate::error::Result;
use crate::lyric::lyric_from_response;
use crate::params;
use crate::request::{ApiSettings, NeteaseClient};
use crate::types::{
    AccountResponse, DownloadUrlResponse, LyricResponse, PlayerUrlResponse, PlaylistItem, Profile,
    RadioResponse, UserPlaylistResponse,
};

const PLAYER_URL_PATH: &str = "interface.music.163.com/eapi/song/enhance/player/url/v1";
const PLAYER_URL_ENCRYPT_PATH: &str = "/api/song/enhance/player/url/v1";
const DOWNLOAD_URL_PATH: &str = "interface.music.163.com/eapi/song/enhance/download/url";
const DOWNLOAD_URL_ENCRYPT_PATH: &str = "/api/song/enhance/download/url";
const LYRIC_PATH: &str = "music.163.com/api/song/lyric?_nmclfl=1";
const WEBLOG_PATH: &str = "music.163.com/weapi/feedback/weblog";
const RADIO_PATH: &str = "music.163.com/weapi/v1/radio/get";
const USER_PLAYLIST_PATH: &str = "music.163.com/weapi/user/playlist";
const ACCOUNT_PATH: &str = "music.163.com/weapi/w/nuser/account/get";
const LOGOUT_PATH: &str = "music.163.com/weapi/logout";

/// Stream level requested for a bitrate.
pub fn quality_level(quality: u32) -> &'static str {
    match quality {
        320_000 => "exhigh",
        999_000 => "lossless",
        _ => "standard",
    }
}

fn os_cookie(os: &str) -> Cookie {
    let mut cookie = Cookie::new();
    cookie.insert("os".to_string(), os.to_string());
    cookie
}

/// High-level client for the remote music API.
///
/// Owns the transport, the cookie jar and the response cache. Cloning is
/// cheap; clones share all three.
#[derive(Clone)]
pub struct NeteaseApi {
    client: Arc<NeteaseClient>,
    cache: ResponseCache,
}

impl NeteaseApi {
    pub fn new(http: Arc<dyn HttpClient>, settings: ApiSettings, cookies: CookieStore) -> Self {
        Self {
            client: Arc::new(NeteaseClient::new(http, settings, cookies)),
            cache: ResponseCache::new(),
        }
    }

    pub fn client(&self) -> &NeteaseClient {
        &self.client
    }

    pub fn cookies(&self) -> &CookieStore {
        self.client.cookies()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Replace the jar with a persisted session.
    pub fn restore_session(&self, cookie: Cookie) {
        self.cache.flush();
        self.cookies().replace(cookie);
    }

    /// Forget the current session locally.
    pub fn clear_session(&self) {
        self.cache.flush();
        self.cookies().clear();
    }

    /// Resolve a playable URL, trying the player endpoint first and the
    /// download endpoint second.
    #[instrument(skip(self))]
    pub async fn song_url(&self, id: u64, quality: u32) -> Result<Option<SongUrl>> {
        match self.player_url(id, quality).await {
            Ok(Some(url)) => return Ok(Some(url)),
            Ok(None) => debug!(id, "Player endpoint returned no full-length URL"),
            Err(e) => warn!(id, error = %e, "Player URL request failed"),
        }
        self.download_url(id, quality).await
    }

    async fn player_url(&self, id: u64, quality: u32) -> Result<Option<SongUrl>> {
        let data = params! {
            "ids" => format!("[{}]", id),
            "level" => quality_level(quality),
            "encodeType" => "flac",
        };
        let response: PlayerUrlResponse = self
            .client
            .eapi_request(
                PLAYER_URL_PATH,
                PLAYER_URL_ENCRYPT_PATH,
                data,
                Some(&os_cookie("pc")),
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .next()
            .and_then(|item| item.into_song_url()))
    }

    async fn download_url(&self, id: u64, quality: u32) -> Result<Option<SongUrl>> {
        let data = params! { "id" => id, "br" => quality };
        let response: DownloadUrlResponse = self
            .client
            .eapi_request(DOWNLOAD_URL_PATH, DOWNLOAD_URL_ENCRYPT_PATH, data, None)
            .await?;
        Ok(response.data.and_then(|item| item.into_song_url()))
    }

    /// Fetch and parse the lyric of `id`.
    #[instrument(skip(self))]
    pub async fn lyric(&self, id: u64) -> Result<LyricData> {
        let data = params! { "id" => id, "tv" => -1, "lv" => -1, "rv" => -1, "kv" => -1 };
        let response: LyricResponse = self
            .client
            .api_request(LYRIC_PATH, data, Some(&os_cookie("ios")))
            .await?;
        Ok(lyric_from_response(&response))
    }

    /// Report `seconds` of listening time.
    #[instrument(skip(self))]
    pub async fn scrobble(&self, id: u64, source_id: u64, seconds: u64) -> Result<()> {
        let logs = json!([{
            "action": "play",
            "json": {
                "download": 0,
                "end": "playend",
                "id": id,
                "sourceId": source_id,
                "time": seconds,
                "type": "song",
                "wifi": 0,
                "source": "list",
            }
        }]);
        let data = params! { "logs" => logs.to_string() };
        let _: Value = self.client.weapi_request(WEBLOG_PATH, data, None).await?;
        debug!(id, seconds, "Scrobbled");
        Ok(())
    }

    /// Next batch of personal radio tracks.
    #[instrument(skip(self))]
    pub async fn personal_fm(&self) -> Result<Vec<TrackItem>> {
        let response: RadioResponse = self
            .client
            .weapi_request(RADIO_PATH, params! {}, None)
            .await?;
        Ok(response.data.into_iter().map(TrackItem::from).collect())
    }

    /// Playlists created or subscribed by `uid`. Non-empty results are cached.
    #[instrument(skip(self))]
    pub async fn user_playlists(&self, uid: u64) -> Result<Vec<PlaylistItem>> {
        let key = format!("user_playlist{}", uid);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(items) = serde_json::from_value(cached) {
                return Ok(items);
            }
        }

        let data = params! { "uid" => uid, "limit" => 30, "offset" => 0, "includeVideo" => true };
        let response: UserPlaylistResponse = self
            .client
            .weapi_request(USER_PLAYLIST_PATH, data, None)
            .await?;
        let items: Vec<PlaylistItem> = response.playlist.into_iter().map(Into::into).collect();
        if !items.is_empty() {
            self.cache.set(key, serde_json::to_value(&items)?, None);
        }
        Ok(items)
    }

    /// Profile of the account behind the current jar, if logged in.
    #[instrument(skip(self))]
    pub async fn account(&self) -> Result<Option<Profile>> {
        let response: AccountResponse = self
            .client
            .weapi_request(ACCOUNT_PATH, params! {}, None)
            .await?;
        Ok(response.profile)
    }

    /// Log out remotely, then clear the jar.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _: Value = self
            .client
            .weapi_request(LOGOUT_PATH, params! {}, None)
            .await?;
        self.clear_session();
        info!("Logged out");
        Ok(())
    }
}

impl std::fmt::Debug for NeteaseApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeteaseApi")
            .field("client", &self.client)
            .field("cached_entries", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_level() {
        assert_eq!(quality_level(128_000), "standard");
        assert_eq!(quality_level(192_000), "standard");
        assert_eq!(quality_level(320_000), "exhigh");
        assert_eq!(quality_level(999_000), "lossless");
    }
}
