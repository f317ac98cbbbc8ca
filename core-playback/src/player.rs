//! # Player Session
//!
//! The single actor that owns all playback state. Everything that can change
//! that state arrives as a message: commands from the host, completions of
//! spawned I/O, and two timers.
//!
//! ## Overview
//!
//! ```text
//!              ┌──────────── PlayerHandle (commands) ──────────┐
//!              │                                               ▼
//!  resolve / lyric tasks ──(internal)──> PlayerActor ──> PlaybackDevice
//!              ▲                         │   │   │
//!              └──── spawn ──────────────┘   │   └──> EventBus
//!                                  800 ms poll / 8 min sweep
//! ```
//!
//! ## Load generations
//!
//! Each `load` stamps a new generation. Resolution (cache lookup, URL,
//! download) runs on a spawned task and reports back with the generation it
//! was started under; a completion whose generation is no longer current is
//! discarded and reported as `Ended { reason: Superseded }`. Nothing is
//! cancelled; stale work simply has no effect.
//!
//! ## Polling
//!
//! While playing, the device is polled every 800 ms. An empty device ends
//! the track. Otherwise the position drives two lyric cursors and, once past
//! 120 s, a single prefetch of whatever plays next.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (player, task) = Player::spawn(deps, PlayerConfig::from_session(&config));
//! player.load(TrackDescriptor::remote(track, playlist_id, next)).await?;
//! player.toggle().await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bridge_traits::http::HttpClient;
use bridge_traits::music::{LyricData, LyricLine, MusicProvider, TrackItem};
use bridge_traits::playback::PlaybackDevice;
use bridge_traits::time::Clock;
use core_runtime::events::{
    CoreEvent, EndReason, EventBus, LyricEvent, PlaybackEvent, QueueEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::cache::{LyricCache, TrackCache};
use crate::config::{PlayerConfig, PlayerState};
use crate::download::{sweep_temp_dir, CacheTarget, DownloadRequest, Downloader};
use crate::error::{PlaybackError, Result};
use crate::fm::PersonalFm;

const COMMAND_BUFFER: usize = 64;

// ============================================================================
// Public Types
// ============================================================================

/// What to play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackDescriptor {
    /// A file on disk, played verbatim with no caching, lyrics or scrobble.
    Local { path: PathBuf },
    /// A catalogue track.
    Remote {
        track: TrackItem,
        /// Playlist the track was started from; `0` when none.
        #[serde(default)]
        playlist_id: u64,
        /// Track queued after this one, used for prefetch outside FM mode.
        #[serde(default)]
        next: Option<TrackItem>,
    },
}

impl TrackDescriptor {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn remote(track: TrackItem, playlist_id: u64, next: Option<TrackItem>) -> Self {
        Self::Remote {
            track,
            playlist_id,
            next,
        }
    }

    /// Catalogue id; `None` for local files.
    pub fn track_id(&self) -> Option<u64> {
        match self {
            Self::Local { .. } => None,
            Self::Remote { track, .. } => Some(track.id),
        }
    }
}

/// Point-in-time view of the session, for status queries and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub generation: u64,
    pub track_id: Option<u64>,
    pub playlist_id: u64,
    pub duration_ms: u64,
    pub next_track: Option<TrackItem>,
    pub fm_mode: bool,
    pub prefetch_locked: bool,
    /// Current line in the original and translated tables.
    pub lyric_index: (usize, usize),
    pub lyric_delay_secs: f64,
    pub volume: u8,
    pub speed: f32,
}

/// Everything the player talks to.
#[derive(Clone)]
pub struct PlayerDeps {
    pub device: Arc<dyn PlaybackDevice>,
    pub provider: Arc<dyn MusicProvider>,
    pub http: Arc<dyn HttpClient>,
    pub track_cache: Arc<TrackCache>,
    pub lyric_cache: Arc<LyricCache>,
    pub fm: Arc<PersonalFm>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

// ============================================================================
// Lyric Cursor
// ============================================================================

/// Monotonic read heads over the original and translated lyric tables.
///
/// Each head counts the lines whose timestamp has been reached; the current
/// line is one behind it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyricCursor {
    original: usize,
    translation: usize,
}

impl LyricCursor {
    /// Advance both heads to `position` seconds. Returns `true` if either moved.
    pub fn advance(&mut self, lyric: &LyricData, position: f64) -> bool {
        let original = advance_head(self.original, &lyric.original, position);
        let translation = advance_head(self.translation, &lyric.translation, position);
        let changed = original != self.original || translation != self.translation;
        self.original = original;
        self.translation = translation;
        changed
    }

    /// Index of the current line in each table.
    pub fn current(&self) -> (usize, usize) {
        (
            self.original.saturating_sub(1),
            self.translation.saturating_sub(1),
        )
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn advance_head(mut head: usize, lines: &[LyricLine], position: f64) -> usize {
    while head < lines.len() && lines[head].time <= position {
        head += 1;
    }
    head
}

/// Seconds to report for a finished listening session, or `None` when
/// either the listening time or the declared duration is at or below the
/// threshold.
pub fn scrobble_seconds(elapsed_ms: u64, declared_ms: u64, threshold_ms: u64) -> Option<u64> {
    if elapsed_ms > threshold_ms && declared_ms > threshold_ms {
        Some(elapsed_ms.min(declared_ms) / 1000)
    } else {
        None
    }
}

// ============================================================================
// Handle
// ============================================================================

enum Command {
    Load(TrackDescriptor),
    Play,
    Pause,
    Toggle,
    Stop,
    Seek(f64),
    SetSpeed(f32),
    SetVolume(u8),
    SetLyricDelay(f64),
    SetFmMode(bool),
    SetQuality(u32),
    SetNext(Option<TrackItem>),
    ResetLyric,
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    Shutdown,
}

/// Cloneable sender side of the player actor.
#[derive(Clone, Debug)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Command>,
}

impl PlayerHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PlaybackError::PlayerClosed)
    }

    /// Start loading a track; progress is reported on the event bus.
    pub async fn load(&self, descriptor: TrackDescriptor) -> Result<()> {
        self.send(Command::Load(descriptor)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.send(Command::Toggle).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    /// Seek relative to the current position.
    pub async fn seek(&self, offset_secs: f64) -> Result<()> {
        self.send(Command::Seek(offset_secs)).await
    }

    pub async fn set_speed(&self, speed: f32) -> Result<()> {
        self.send(Command::SetSpeed(speed)).await
    }

    /// Set output volume; values above 100 are clamped.
    pub async fn set_volume(&self, level: u8) -> Result<()> {
        self.send(Command::SetVolume(level)).await
    }

    pub async fn set_lyric_delay(&self, delay_secs: f64) -> Result<()> {
        self.send(Command::SetLyricDelay(delay_secs)).await
    }

    pub async fn set_fm_mode(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetFmMode(enabled)).await
    }

    /// Change the bitrate used by subsequent loads.
    pub async fn set_quality(&self, quality: u32) -> Result<()> {
        self.send(Command::SetQuality(quality)).await
    }

    /// Replace the track queued after the current one.
    pub async fn set_next(&self, next: Option<TrackItem>) -> Result<()> {
        self.send(Command::SetNext(next)).await
    }

    /// Rewind the lyric cursors and re-broadcast the current tables.
    pub async fn reset_lyric(&self) -> Result<()> {
        self.send(Command::ResetLyric).await
    }

    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| PlaybackError::PlayerClosed)
    }

    /// Stop the actor after it drains earlier commands.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Entry point for starting the player actor.
pub struct Player;

impl Player {
    /// Spawn the actor on the current runtime.
    pub fn spawn(deps: PlayerDeps, config: PlayerConfig) -> (PlayerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = PlayerActor::new(deps, config);
        let task = tokio::spawn(actor.run(rx));
        (PlayerHandle { tx }, task)
    }
}

enum Internal {
    Resolved {
        generation: u64,
        descriptor: TrackDescriptor,
        outcome: Result<ResolvedSource>,
    },
    LyricReady {
        generation: u64,
        track_id: u64,
        lyric: LyricData,
    },
}

struct ResolvedSource {
    path: PathBuf,
    /// Served from a local file or the track cache.
    local: bool,
}

#[derive(Debug, Default)]
struct Session {
    track_id: Option<u64>,
    playlist_id: u64,
    duration_ms: u64,
    started_at_ms: Option<i64>,
}

struct PlayerActor {
    deps: PlayerDeps,
    downloader: Downloader,
    config: PlayerConfig,
    state: PlayerState,
    generation: u64,
    /// Track id whose resolution is in flight (`0` for local files).
    loading: Option<u64>,
    session: Session,
    next_track: Option<TrackItem>,
    prefetch_locked: bool,
    fm_mode: bool,
    lyric: LyricData,
    cursor: LyricCursor,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
}

impl PlayerActor {
    fn new(deps: PlayerDeps, config: PlayerConfig) -> Self {
        let downloader = Downloader::new(deps.http.clone(), deps.track_cache.clone());
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            deps,
            downloader,
            config,
            state: PlayerState::Idle,
            generation: 0,
            loading: None,
            session: Session::default(),
            next_track: None,
            prefetch_locked: false,
            fm_mode: false,
            lyric: LyricData::placeholder(),
            cursor: LyricCursor::default(),
            internal_tx,
            internal_rx: Some(internal_rx),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut internal_rx) = self.internal_rx.take() else {
            return;
        };

        if let Err(e) = self.deps.device.set_volume(self.config.volume).await {
            warn!(error = %e, "Failed to apply initial volume");
        }
        if let Err(e) = self.deps.device.set_speed(self.config.speed).await {
            warn!(error = %e, "Failed to apply initial speed");
        }

        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sweep_every = self.config.temp_sweep_interval;
        let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Player started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(message) = internal_rx.recv() => self.handle_internal(message).await,
                _ = poll.tick() => self.poll().await,
                _ = sweep.tick() => self.sweep_temp().await,
            }
        }
        info!("Player stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Load(descriptor) => self.start_load(descriptor),
            Command::Play => self.play().await,
            Command::Pause => self.pause().await,
            Command::Toggle => {
                if self.state == PlayerState::Playing {
                    self.pause().await
                } else {
                    self.play().await
                }
            }
            Command::Stop => self.stop().await,
            Command::Seek(offset) => {
                if let Err(e) = self.deps.device.seek(offset).await {
                    warn!(error = %e, offset, "Seek failed");
                }
            }
            Command::SetSpeed(speed) => match self.deps.device.set_speed(speed).await {
                Ok(()) => {
                    self.config.speed = speed;
                    self.emit(CoreEvent::Playback(PlaybackEvent::SpeedChanged { speed }));
                }
                Err(e) => warn!(error = %e, speed, "Failed to set speed"),
            },
            Command::SetVolume(level) => {
                let level = level.min(100);
                match self.deps.device.set_volume(level).await {
                    Ok(()) => {
                        self.config.volume = level;
                        self.emit(CoreEvent::Playback(PlaybackEvent::VolumeChanged { level }));
                    }
                    Err(e) => warn!(error = %e, level, "Failed to set volume"),
                }
            }
            Command::SetLyricDelay(delay_secs) => {
                self.config.lyric_delay_secs = delay_secs;
                self.emit(CoreEvent::Lyric(LyricEvent::DelayChanged { delay_secs }));
            }
            Command::SetFmMode(enabled) => {
                self.fm_mode = enabled;
                self.emit(CoreEvent::Queue(QueueEvent::FmModeChanged { enabled }));
            }
            Command::SetQuality(quality) => self.config.set_quality(quality),
            Command::SetNext(next) => {
                self.next_track = next.clone();
                self.emit(CoreEvent::Queue(QueueEvent::NextChanged { track: next }));
            }
            Command::ResetLyric => {
                self.cursor.reset();
                self.emit(CoreEvent::Lyric(LyricEvent::Updated {
                    track_id: self.session.track_id.unwrap_or(0),
                    lyric: self.lyric.clone(),
                }));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Resolved {
                generation,
                descriptor,
                outcome,
            } => self.finish_load(generation, descriptor, outcome).await,
            Internal::LyricReady {
                generation,
                track_id,
                lyric,
            } => {
                if generation == self.generation {
                    self.set_lyric(track_id, lyric);
                } else {
                    debug!(track_id, generation, "Dropping lyric of superseded load");
                }
            }
        }
    }

    // ========================================================================
    // Load
    // ========================================================================

    #[instrument(skip(self, descriptor), fields(track_id = ?descriptor.track_id()))]
    fn start_load(&mut self, descriptor: TrackDescriptor) {
        self.generation += 1;
        let generation = self.generation;
        let track_id = descriptor.track_id().unwrap_or(0);

        self.state = PlayerState::Loading;
        self.loading = Some(track_id);
        info!(generation, "Loading track");
        self.emit(CoreEvent::Playback(PlaybackEvent::Loading {
            track_id,
            generation,
        }));

        let resolver = self.resolver();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = resolver.resolve(&descriptor).await;
            let _ = tx.send(Internal::Resolved {
                generation,
                descriptor,
                outcome,
            });
        });
    }

    async fn finish_load(
        &mut self,
        generation: u64,
        descriptor: TrackDescriptor,
        outcome: Result<ResolvedSource>,
    ) {
        let track_id = descriptor.track_id();
        if generation != self.generation {
            debug!(
                ?track_id,
                generation,
                current = self.generation,
                "Discarding superseded load"
            );
            self.emit(CoreEvent::Playback(PlaybackEvent::Ended {
                track_id,
                reason: EndReason::Superseded,
            }));
            return;
        }
        self.loading = None;

        let source = match outcome {
            Ok(source) => source,
            Err(e) => {
                warn!(?track_id, error = %e, "Failed to resolve track");
                self.fail_load(track_id);
                return;
            }
        };

        match self.deps.device.load(&source.path).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(?track_id, path = %source.path.display(), "Device rejected track");
                self.fail_load(track_id);
                return;
            }
            Err(e) => {
                warn!(?track_id, error = %e, "Device load failed");
                self.fail_load(track_id);
                return;
            }
        }
        if let Err(e) = self.deps.device.play().await {
            warn!(?track_id, error = %e, "Device refused to start");
        }

        self.state = PlayerState::Playing;
        self.prefetch_locked = false;

        let now_ms = self.deps.clock.unix_timestamp_millis();
        let track = match descriptor {
            TrackDescriptor::Local { path } => {
                self.next_track = None;
                self.set_lyric(0, LyricData::placeholder());
                self.report_previous_session(now_ms);
                self.session = Session {
                    track_id: None,
                    playlist_id: 0,
                    duration_ms: 0,
                    started_at_ms: Some(now_ms),
                };
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                TrackItem::new(0, name, 0)
            }
            TrackDescriptor::Remote {
                track,
                playlist_id,
                next,
            } => {
                self.next_track = next;
                self.spawn_lyric_fetch(generation, track.id);
                self.report_previous_session(now_ms);
                self.session = Session {
                    track_id: Some(track.id),
                    playlist_id,
                    duration_ms: track.duration_ms,
                    started_at_ms: Some(now_ms),
                };
                track
            }
        };

        info!(track_id = track.id, local = source.local, "Track loaded");
        let playing_id = track.id;
        self.emit(CoreEvent::Playback(PlaybackEvent::Loaded {
            track,
            local: source.local,
        }));
        self.emit(CoreEvent::Playback(PlaybackEvent::Playing {
            track_id: playing_id,
        }));
        self.emit(CoreEvent::Queue(QueueEvent::NextChanged {
            track: self.next_track.clone(),
        }));
    }

    fn fail_load(&mut self, track_id: Option<u64>) {
        self.state = PlayerState::Idle;
        self.emit(CoreEvent::Playback(PlaybackEvent::Ended {
            track_id,
            reason: EndReason::Failed,
        }));
    }

    fn report_previous_session(&self, now_ms: i64) {
        let (Some(id), Some(started)) = (self.session.track_id, self.session.started_at_ms) else {
            return;
        };
        let elapsed_ms = u64::try_from(now_ms - started).unwrap_or(0);
        let threshold_ms = self.config.scrobble_threshold.as_millis() as u64;
        let Some(seconds) = scrobble_seconds(elapsed_ms, self.session.duration_ms, threshold_ms)
        else {
            debug!(track_id = id, elapsed_ms, "Session too short to scrobble");
            return;
        };

        let provider = self.deps.provider.clone();
        let source_id = self.session.playlist_id;
        tokio::spawn(async move {
            match provider.scrobble(id, source_id, seconds).await {
                Ok(()) => debug!(track_id = id, seconds, "Scrobbled"),
                Err(e) => warn!(track_id = id, error = %e, "Scrobble failed"),
            }
        });
    }

    fn spawn_lyric_fetch(&self, generation: u64, track_id: u64) {
        let provider = self.deps.provider.clone();
        let lyric_cache = self.deps.lyric_cache.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let lyric = fetch_lyric(provider.as_ref(), &lyric_cache, track_id).await;
            let _ = tx.send(Internal::LyricReady {
                generation,
                track_id,
                lyric,
            });
        });
    }

    fn set_lyric(&mut self, track_id: u64, lyric: LyricData) {
        self.lyric = lyric.clone();
        self.cursor.reset();
        self.emit(CoreEvent::Lyric(LyricEvent::Updated { track_id, lyric }));
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn play(&mut self) {
        match self.deps.device.play().await {
            Ok(true) => {
                if self.state != PlayerState::Loading {
                    self.state = PlayerState::Playing;
                }
                self.emit(CoreEvent::Playback(PlaybackEvent::Playing {
                    track_id: self.session.track_id.unwrap_or(0),
                }));
            }
            Ok(false) => debug!("Nothing to play"),
            Err(e) => warn!(error = %e, "Play failed"),
        }
    }

    async fn pause(&mut self) {
        match self.deps.device.pause().await {
            Ok(()) => {
                if self.state == PlayerState::Playing {
                    self.state = PlayerState::Paused;
                }
                self.emit(CoreEvent::Playback(PlaybackEvent::Paused {
                    track_id: self.session.track_id.unwrap_or(0),
                }));
            }
            Err(e) => warn!(error = %e, "Pause failed"),
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = self.deps.device.stop().await {
            warn!(error = %e, "Stop failed");
        }
        if self.state != PlayerState::Loading {
            self.state = PlayerState::Idle;
        }
        self.emit(CoreEvent::Playback(PlaybackEvent::Stopped));
    }

    // ========================================================================
    // Timers
    // ========================================================================

    async fn poll(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }

        if self.deps.device.is_empty().await {
            debug!(track_id = ?self.session.track_id, "Device drained");
            self.state = PlayerState::Idle;
            self.emit(CoreEvent::Playback(PlaybackEvent::Ended {
                track_id: self.session.track_id,
                reason: EndReason::Natural,
            }));
            return;
        }

        let position = self.deps.device.position().await;
        if position > self.config.prefetch_after_secs && !self.prefetch_locked {
            self.prefetch_locked = true;
            self.spawn_prefetch();
        }

        let lyric_position = position - self.config.lyric_delay_secs;
        if self.cursor.advance(&self.lyric, lyric_position) {
            let (original, translation) = self.cursor.current();
            self.emit(CoreEvent::Lyric(LyricEvent::Index {
                original,
                translation,
            }));
        }
    }

    fn spawn_prefetch(&self) {
        let resolver = self.resolver();
        let fm = self.deps.fm.clone();
        let lyric_cache = self.deps.lyric_cache.clone();
        let target = (!self.fm_mode).then(|| self.next_track.clone());

        tokio::spawn(async move {
            let next = match target {
                Some(next) => next,
                None => fm.next().await,
            };
            match next {
                Some(track) => resolver.prefetch(&lyric_cache, &track).await,
                None => debug!("Nothing queued to prefetch"),
            }
        });
    }

    async fn sweep_temp(&self) {
        let keep: Vec<String> = self
            .loading
            .into_iter()
            .chain(self.session.track_id)
            .map(|id| id.to_string())
            .collect();
        match sweep_temp_dir(
            &self.config.tmp_dir,
            self.config.temp_max_age,
            &keep,
            SystemTime::now(),
        )
        .await
        {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Swept temp directory"),
            Err(e) => warn!(error = %e, "Temp sweep failed"),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn resolver(&self) -> Resolver {
        Resolver {
            track_cache: self.deps.track_cache.clone(),
            provider: self.deps.provider.clone(),
            downloader: self.downloader.clone(),
            streams_partial_files: self.deps.device.streams_partial_files(),
            quality: self.config.music_quality,
            prebuffer_bytes: self.config.prebuffer_bytes,
            prebuffer_timeout: self.config.prebuffer_timeout,
            tmp_dir: self.config.tmp_dir.clone(),
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state,
            generation: self.generation,
            track_id: self.session.track_id,
            playlist_id: self.session.playlist_id,
            duration_ms: self.session.duration_ms,
            next_track: self.next_track.clone(),
            fm_mode: self.fm_mode,
            prefetch_locked: self.prefetch_locked,
            lyric_index: self.cursor.current(),
            lyric_delay_secs: self.config.lyric_delay_secs,
            volume: self.config.volume,
            speed: self.config.speed,
        }
    }

    fn emit(&self, event: CoreEvent) {
        let _ = self.deps.event_bus.emit(event);
    }
}

// ============================================================================
// Source Resolution
// ============================================================================

#[derive(Clone)]
struct Resolver {
    track_cache: Arc<TrackCache>,
    provider: Arc<dyn MusicProvider>,
    downloader: Downloader,
    streams_partial_files: bool,
    quality: u32,
    prebuffer_bytes: u64,
    prebuffer_timeout: std::time::Duration,
    tmp_dir: PathBuf,
}

impl Resolver {
    async fn resolve(&self, descriptor: &TrackDescriptor) -> Result<ResolvedSource> {
        let track = match descriptor {
            TrackDescriptor::Local { path } => {
                return Ok(ResolvedSource {
                    path: path.clone(),
                    local: true,
                })
            }
            TrackDescriptor::Remote { track, .. } => track,
        };

        if let Some(path) = self.track_cache.get(&track.cache_key()).await {
            debug!(track_id = track.id, "Track cache hit");
            return Ok(ResolvedSource { path, local: true });
        }

        let url = self
            .provider
            .song_url(track.id, self.quality)
            .await?
            .ok_or(PlaybackError::NoSource(track.id))?;

        let request = DownloadRequest {
            url: url.url,
            dest: self.tmp_dir.join(track.id.to_string()),
            prebuffer_bytes: self.streams_partial_files.then_some(self.prebuffer_bytes),
            cache: Some(cache_target(track, url.md5)),
        };
        let path = self.downloader.fetch(request, self.prebuffer_timeout).await?;
        Ok(ResolvedSource { path, local: false })
    }

    async fn prefetch(&self, lyric_cache: &LyricCache, track: &TrackItem) {
        if self.track_cache.contains(&track.cache_key()).await {
            debug!(track_id = track.id, "Next track already cached");
        } else {
            match self.provider.song_url(track.id, self.quality).await {
                Ok(Some(url)) => {
                    let request = DownloadRequest {
                        url: url.url,
                        dest: self.tmp_dir.join(format!("{}-next", track.id)),
                        prebuffer_bytes: None,
                        cache: Some(cache_target(track, url.md5)),
                    };
                    match self.downloader.spawn(request).await {
                        Ok(Ok(bytes)) => debug!(track_id = track.id, bytes, "Prefetched"),
                        Ok(Err(e)) => warn!(track_id = track.id, error = %e, "Prefetch failed"),
                        Err(e) => warn!(track_id = track.id, error = %e, "Prefetch task failed"),
                    }
                }
                Ok(None) => debug!(track_id = track.id, "No source to prefetch"),
                Err(e) => warn!(track_id = track.id, error = %e, "Prefetch URL lookup failed"),
            }
        }

        fetch_lyric(self.provider.as_ref(), lyric_cache, track.id).await;
    }
}

fn cache_target(track: &TrackItem, md5: Option<String>) -> CacheTarget {
    CacheTarget {
        key: track.cache_key(),
        file_name: track.cache_file_name(),
        md5,
    }
}

/// Lyric for `track_id`: the cache first, then the provider. Real lyrics are
/// written back; failures fall back to the placeholder.
pub async fn fetch_lyric(
    provider: &dyn MusicProvider,
    lyric_cache: &LyricCache,
    track_id: u64,
) -> LyricData {
    let key = track_id.to_string();
    if let Some(lyric) = lyric_cache.get(&key).await {
        return lyric;
    }

    match provider.lyric(track_id).await {
        Ok(lyric) => {
            if !lyric.is_placeholder() {
                if let Err(e) = lyric_cache.put(&key, &lyric).await {
                    warn!(track_id, error = %e, "Failed to cache lyric");
                }
            }
            lyric
        }
        Err(e) => {
            warn!(track_id, error = %e, "Lyric fetch failed");
            LyricData::placeholder()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(time: f64) -> LyricLine {
        LyricLine {
            time,
            text: format!("at {}", time),
        }
    }

    #[test]
    fn test_scrobble_thresholds() {
        assert_eq!(scrobble_seconds(61_000, 200_000, 60_000), Some(61));
        assert_eq!(scrobble_seconds(300_000, 200_000, 60_000), Some(200));
        assert_eq!(scrobble_seconds(60_000, 200_000, 60_000), None);
        assert_eq!(scrobble_seconds(120_000, 60_000, 60_000), None);
        assert_eq!(scrobble_seconds(90_500, 61_999, 60_000), Some(61));
    }

    #[test]
    fn test_cursor_advances_independently() {
        let lyric = LyricData {
            original: vec![line(1.0), line(3.0), line(5.0)],
            translation: vec![line(3.0)],
            contributors: Vec::new(),
        };
        let mut cursor = LyricCursor::default();

        assert!(!cursor.advance(&lyric, 0.5));
        assert!(cursor.advance(&lyric, 1.0));
        assert_eq!(cursor.current(), (0, 0));

        assert!(cursor.advance(&lyric, 4.0));
        assert_eq!(cursor.current(), (1, 0));

        assert!(!cursor.advance(&lyric, 4.5));
        assert!(cursor.advance(&lyric, 100.0));
        assert_eq!(cursor.current(), (2, 0));
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let lyric = LyricData {
            original: vec![line(1.0), line(2.0)],
            ..LyricData::default()
        };
        let mut cursor = LyricCursor::default();
        cursor.advance(&lyric, 2.5);
        assert!(!cursor.advance(&lyric, 0.0));
        assert_eq!(cursor.current(), (1, 0));

        cursor.reset();
        assert_eq!(cursor.current(), (0, 0));
    }

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor: TrackDescriptor = serde_json::from_str(
            r#"{"kind":"remote","track":{"id":9,"name":"N","durationMs":1000}}"#,
        )
        .unwrap();
        assert_eq!(descriptor.track_id(), Some(9));
        assert_eq!(TrackDescriptor::local("/a.mp3").track_id(), None);
    }
}
