//! [`MusicProvider`] implementation backed by [`NeteaseApi`].

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::music::{LyricData, MusicProvider, SongUrl, TrackItem};

use crate::api::NeteaseApi;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl MusicProvider for NeteaseApi {
    async fn song_url(&self, id: u64, quality: u32) -> Result<Option<SongUrl>> {
        Ok(NeteaseApi::song_url(self, id, quality).await?)
    }

    async fn lyric(&self, id: u64) -> Result<LyricData> {
        Ok(NeteaseApi::lyric(self, id).await?)
    }

    async fn scrobble(&self, id: u64, source_id: u64, seconds: u64) -> Result<()> {
        Ok(NeteaseApi::scrobble(self, id, source_id, seconds).await?)
    }

    async fn personal_fm(&self) -> Result<Vec<TrackItem>> {
        Ok(NeteaseApi::personal_fm(self).await?)
    }
}
