//! # Session Service
//!
//! Owns one instance of every engine component and routes control messages
//! to them.
//!
//! ## Lifecycle
//!
//! [`CoreService::init`] creates the settings directories, restores the
//! session cookie, reconciles the track cache with the disk and spawns the
//! player actor. [`CoreService::shutdown`] stops the actor, checkpoints the
//! cache index, empties the scratch directory and stops the response-cache
//! sweeper. Failing to create the directories is the only fatal startup
//! error.
//!
//! ## Queue relay
//!
//! Queue edits from one UI window come back out of the event bus as
//! [`QueueEvent`]s for every subscriber. A closing window may park its
//! queue with `Retain`; the next `Connect` takes it.

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    music::{MusicProvider, TrackItem},
    playback::PlaybackDevice,
    time::{Clock, SystemClock},
};
use core_playback::{
    device::{DeviceCommand, RelayDevice},
    DownloadRequest, Downloader, LyricCache, PersonalFm, Player, PlayerConfig, PlayerDeps,
    PlayerHandle, TrackCache, TrackDescriptor,
};
use core_runtime::{
    config::{validate_quality, SessionConfig},
    events::{
        CacheEvent, CacheKind, CoreEvent, EventBus, QueueEvent, DEFAULT_EVENT_BUFFER_SIZE,
    },
};
use provider_netease::{ApiSettings, Cookie, CookieStore, NeteaseApi};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::control::{ControlMessage, ControlReply};
use crate::error::{CoreError, Result};

/// Host-provided capabilities the engine runs on.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub device: Arc<dyn PlaybackDevice>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    pub fn new(http_client: Arc<dyn HttpClient>, device: Arc<dyn PlaybackDevice>) -> Self {
        Self {
            http_client,
            device,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Dependencies for an audio engine living in another process.
    ///
    /// The host drains the returned receiver to drive the remote engine and
    /// feeds its reports back through [`RelayDevice::report`].
    pub fn relayed(
        http_client: Arc<dyn HttpClient>,
    ) -> (Self, Arc<RelayDevice>, mpsc::UnboundedReceiver<DeviceCommand>) {
        let (device, commands) = RelayDevice::new();
        let device = Arc::new(device);
        let deps = Self::new(http_client, device.clone());
        (deps, device, commands)
    }
}

impl std::fmt::Debug for CoreDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreDependencies").finish_non_exhaustive()
    }
}

/// The running session engine.
pub struct CoreService {
    config: SessionConfig,
    event_bus: EventBus,
    api: NeteaseApi,
    track_cache: Arc<TrackCache>,
    lyric_cache: Arc<LyricCache>,
    fm: Arc<PersonalFm>,
    downloader: Downloader,
    player: PlayerHandle,
    player_task: Mutex<Option<JoinHandle<()>>>,
    sweeper: JoinHandle<()>,
    retained: Mutex<Vec<serde_json::Value>>,
}

impl CoreService {
    /// Bring every component up.
    ///
    /// `cookie` is the jar persisted by the host from the last run, if any.
    #[instrument(skip_all, fields(settings_dir = %config.settings_dir.display()))]
    pub async fn init(
        config: SessionConfig,
        deps: CoreDependencies,
        cookie: Option<Cookie>,
    ) -> Result<Self> {
        for dir in config.required_dirs() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| CoreError::Startup {
                    path: dir.clone(),
                    source,
                })?;
        }

        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);

        let cookies = CookieStore::new().with_event_bus(event_bus.clone());
        let api = NeteaseApi::new(
            deps.http_client.clone(),
            ApiSettings::from_config(&config),
            cookies,
        );
        if let Some(cookie) = cookie {
            api.restore_session(cookie);
        }
        let sweeper = api.cache().spawn_sweeper();

        let track_cache = Arc::new(
            TrackCache::new(
                config.music_cache_dir(),
                config.music_index_path(),
                config.cache_size_bytes,
            )
            .with_event_bus(event_bus.clone()),
        );
        if let Err(e) = track_cache.init().await {
            warn!(error = %e, "Track cache reconciliation failed; starting empty");
        }

        let lyric_cache = Arc::new(LyricCache::new(
            config.lyric_cache_dir(),
            deps.clock.clone(),
        ));
        let provider: Arc<dyn MusicProvider> = Arc::new(api.clone());
        let fm = Arc::new(PersonalFm::new(provider.clone()));
        let downloader = Downloader::new(deps.http_client.clone(), track_cache.clone());

        let player_deps = PlayerDeps {
            device: deps.device.clone(),
            provider,
            http: deps.http_client.clone(),
            track_cache: track_cache.clone(),
            lyric_cache: lyric_cache.clone(),
            fm: fm.clone(),
            clock: deps.clock.clone(),
            event_bus: event_bus.clone(),
        };
        let (player, player_task) = Player::spawn(player_deps, PlayerConfig::from_session(&config));

        info!(
            quality = config.music_quality,
            cache_budget = config.cache_size_bytes,
            logged_in = api.cookies().is_logged_in(),
            "Session engine started"
        );

        Ok(Self {
            config,
            event_bus,
            api,
            track_cache,
            lyric_cache,
            fm,
            downloader,
            player,
            player_task: Mutex::new(Some(player_task)),
            sweeper,
            retained: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn api(&self) -> &NeteaseApi {
        &self.api
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn track_cache(&self) -> &Arc<TrackCache> {
        &self.track_cache
    }

    pub fn lyric_cache(&self) -> &Arc<LyricCache> {
        &self.lyric_cache
    }

    /// Dispatch one control message.
    #[instrument(skip(self, message), fields(message = message.name()))]
    pub async fn handle(&self, message: ControlMessage) -> Result<ControlReply> {
        debug!("Handling control message");
        match message {
            ControlMessage::Init {
                quality,
                cache_size,
                volume,
            } => {
                validate_quality(quality)?;
                if cache_size == 0 {
                    return Err(CoreError::Config(core_runtime::Error::Config(
                        "Cache size must be greater than 0".to_string(),
                    )));
                }
                self.track_cache.set_budget(cache_size).await?;
                self.player.set_quality(quality).await?;
                if let Some(level) = volume {
                    self.player.set_volume(level).await?;
                }
            }
            ControlMessage::DeleteCache { key } => self.api.cache().delete(&key),
            ControlMessage::ClearLyricCache => {
                self.lyric_cache.clear().await?;
                let _ = self.event_bus.emit(CoreEvent::Cache(CacheEvent::Cleared {
                    kind: CacheKind::Lyric,
                }));
            }
            ControlMessage::ClearMusicCache => self.track_cache.clear().await?,
            ControlMessage::Download { url, path } => self.download(url, path),
            ControlMessage::Load { descriptor } => self.player.load(descriptor).await?,
            ControlMessage::LyricDelay { delay_secs } => {
                self.player.set_lyric_delay(delay_secs).await?
            }
            ControlMessage::Toggle => self.player.toggle().await?,
            ControlMessage::Play => self.player.play().await?,
            ControlMessage::Pause => self.player.pause().await?,
            ControlMessage::Stop => self.player.stop().await?,
            ControlMessage::Seek { offset_secs } => self.player.seek(offset_secs).await?,
            ControlMessage::Speed { speed } => self.player.set_speed(speed).await?,
            ControlMessage::Volume { level } => self.player.set_volume(level).await?,
            ControlMessage::Fm { enabled } => {
                let was_enabled = self.player.snapshot().await?.fm_mode;
                self.player.set_fm_mode(enabled).await?;
                if enabled && !was_enabled {
                    let track = self.play_fm_head().await?;
                    return Ok(ControlReply::FmTrack { track });
                }
                if !enabled {
                    self.fm.reset().await;
                }
            }
            ControlMessage::FmNext => {
                let track = self.play_fm_head().await?;
                return Ok(ControlReply::FmTrack { track });
            }
            ControlMessage::QueueChanged { next } => self.player.set_next(next).await?,
            ControlMessage::QueueAdd { items, index } => {
                self.relay_queue(QueueEvent::Added { items, index })
            }
            ControlMessage::QueueClear => self.relay_queue(QueueEvent::Cleared),
            ControlMessage::QueueDelete { id } => self.relay_queue(QueueEvent::Deleted { id }),
            ControlMessage::QueueNew { items, id } => {
                self.relay_queue(QueueEvent::Replaced { items, id })
            }
            ControlMessage::QueuePlay { id } => self.relay_queue(QueueEvent::Played { id }),
            ControlMessage::QueueShift { index } => {
                self.relay_queue(QueueEvent::Shifted { index })
            }
            ControlMessage::QueueSort { items } => self.relay_queue(QueueEvent::Sorted { items }),
            ControlMessage::Retain { items } => {
                debug!(count = items.len(), "Queue parked");
                *self.retained.lock().await = items;
            }
            ControlMessage::Connect => {
                let items = std::mem::take(&mut *self.retained.lock().await);
                return Ok(ControlReply::Retained { items });
            }
            ControlMessage::RestoreSession { cookie } => self.api.restore_session(cookie),
            ControlMessage::Logout => {
                if let Err(e) = self.api.logout().await {
                    warn!(error = %e, "Remote logout failed; clearing local session");
                    self.api.clear_session();
                }
                self.fm.reset().await;
            }
            ControlMessage::Status => {
                let snapshot = self.player.snapshot().await?;
                return Ok(ControlReply::Status { snapshot });
            }
        }
        Ok(ControlReply::Ack)
    }

    /// Stop the player, persist the cache index and stop background tasks.
    ///
    /// The scratch directory is emptied but left in place.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.player.shutdown().await {
            debug!(error = %e, "Player already stopped");
        }
        if let Some(task) = self.player_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Player task ended abnormally");
            }
        }
        self.sweeper.abort();
        self.track_cache.store().await?;
        self.reset_tmp_dir().await;
        info!("Session engine stopped");
        Ok(())
    }

    async fn reset_tmp_dir(&self) {
        let dir = self.config.tmp_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to empty scratch directory"),
        }
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to recreate scratch directory");
        }
    }

    fn relay_queue(&self, event: QueueEvent) {
        if self.event_bus.emit(CoreEvent::Queue(event)).is_err() {
            debug!("No window listening for queue edits");
        }
    }

    async fn play_fm_head(&self) -> Result<Option<TrackItem>> {
        let track = self.fm.head().await;
        match &track {
            Some(track) => {
                self.player
                    .load(TrackDescriptor::remote(track.clone(), 0, None))
                    .await?
            }
            None => warn!("Personal FM feed is empty"),
        }
        Ok(track)
    }

    fn download(&self, url: String, path: std::path::PathBuf) {
        let request = DownloadRequest {
            url,
            dest: path.clone(),
            prebuffer_bytes: None,
            cache: None,
        };
        let task = self.downloader.spawn(request);
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(bytes)) => info!(path = %path.display(), bytes, "Download finished"),
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Download failed"),
                Err(e) => warn!(error = %e, "Download task ended abnormally"),
            }
        });
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}
