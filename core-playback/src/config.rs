//! # Player Configuration
//!
//! Timing constants and tunables for the player session, plus the
//! [`PlayerState`] machine the session moves through.

use core_runtime::config::{prebuffer_bytes_for, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Player session configuration.
///
/// Built from a [`SessionConfig`] via [`PlayerConfig::from_session`]; the
/// timing fields keep their defaults unless a test shortens them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Directory receiving partial downloads.
    pub tmp_dir: PathBuf,

    /// Preferred bitrate passed to URL resolution.
    pub music_quality: u32,

    /// Bytes that must be on disk before a streaming load proceeds.
    pub prebuffer_bytes: u64,

    /// Upper bound on waiting for the pre-buffer gate.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_prebuffer_timeout")]
    pub prebuffer_timeout: Duration,

    /// Position polling period while playing.
    ///
    /// Default: 800 ms.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Playback position (seconds) after which the next track is prefetched.
    ///
    /// Default: 120 seconds.
    #[serde(default = "default_prefetch_after_secs")]
    pub prefetch_after_secs: f64,

    /// Minimum listening time and declared duration for a scrobble.
    ///
    /// Default: 60 seconds.
    #[serde(default = "default_scrobble_threshold")]
    pub scrobble_threshold: Duration,

    /// Period of the temp directory sweep.
    ///
    /// Default: 8 minutes.
    #[serde(default = "default_temp_sweep_interval")]
    pub temp_sweep_interval: Duration,

    /// Temp files older than this are removed by the sweep.
    ///
    /// Default: 8 minutes.
    #[serde(default = "default_temp_max_age")]
    pub temp_max_age: Duration,

    /// Initial output volume, 0..=100.
    pub volume: u8,

    /// Initial playback rate.
    pub speed: f32,

    /// Seconds subtracted from the position before lyric lookup.
    pub lyric_delay_secs: f64,
}

impl PlayerConfig {
    /// Derive the player tunables from the session configuration.
    pub fn from_session(session: &SessionConfig) -> Self {
        Self {
            tmp_dir: session.tmp_dir(),
            music_quality: session.music_quality,
            prebuffer_bytes: session.prebuffer_bytes(),
            prebuffer_timeout: default_prebuffer_timeout(),
            poll_interval: default_poll_interval(),
            prefetch_after_secs: default_prefetch_after_secs(),
            scrobble_threshold: default_scrobble_threshold(),
            temp_sweep_interval: default_temp_sweep_interval(),
            temp_max_age: default_temp_max_age(),
            volume: session.volume,
            speed: session.speed,
            lyric_delay_secs: session.lyric_delay_secs,
        }
    }

    /// Switch bitrate; the pre-buffer gate follows it.
    pub fn set_quality(&mut self, quality: u32) {
        self.music_quality = quality;
        self.prebuffer_bytes = prebuffer_bytes_for(quality);
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }

        if self.temp_sweep_interval.is_zero() {
            return Err("temp_sweep_interval must be > 0".to_string());
        }

        if self.prebuffer_timeout.is_zero() {
            return Err("prebuffer_timeout must be > 0".to_string());
        }

        if self.volume > 100 {
            return Err("volume must be between 0 and 100".to_string());
        }

        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err("speed must be a positive number".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_prebuffer_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(800)
}

fn default_prefetch_after_secs() -> f64 {
    120.0
}

fn default_scrobble_threshold() -> Duration {
    Duration::from_secs(60)
}

fn default_temp_sweep_interval() -> Duration {
    Duration::from_secs(8 * 60)
}

fn default_temp_max_age() -> Duration {
    Duration::from_secs(8 * 60)
}

// ============================================================================
// Player State
// ============================================================================

/// Current state of the player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// Nothing loaded, or the last track ended.
    Idle,
    /// A load is resolving its source.
    Loading,
    Playing,
    Paused,
}

impl PlayerState {
    /// Returns `true` if a track is loaded on the device.
    pub fn has_track(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}
