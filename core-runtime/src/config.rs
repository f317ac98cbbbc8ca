//! # Session Configuration Module
//!
//! Provides configuration management for the cloud-music session engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`SessionConfig`] holding every tunable of the engine: where state lives on
//! disk, the preferred bitrate, the track cache budget, output volume and
//! speed, and how the remote API is reached. [`SessionConfigBuilder::build`]
//! validates eagerly so a bad value fails at startup instead of mid-playback.
//!
//! ## Environment
//!
//! [`SessionConfig::from_env`] layers these variables over the defaults:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SETTING_DIR` | `settings_dir` |
//! | `CM_MUSIC_QUALITY` | `music_quality` |
//! | `CM_MUSIC_CACHE_SIZE` | `cache_size_bytes` (bytes) |
//! | `CM_VOLUME` | `volume` |
//! | `CM_SPEED` | `speed` |
//! | `CM_FOREIGN` | `foreign` |
//! | `CM_HTTPS_API` | `https` (`"0"` selects plain http) |
//! | `CM_ANONYMOUS_TOKEN` | `anonymous_token` |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//!
//! let config = SessionConfig::builder()
//!     .settings_dir("/home/me/.cloudmusic")
//!     .music_quality(320_000)
//!     .cache_size_bytes(2 * 1024 * 1024 * 1024)
//!     .build()?;
//!
//! assert!(config.music_index_path().ends_with("cache/music-list"));
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Bitrates accepted by the remote API.
pub const SUPPORTED_QUALITIES: [u32; 4] = [128_000, 192_000, 320_000, 999_000];

/// Lossless tier; selects the larger pre-buffer gate.
pub const LOSSLESS_QUALITY: u32 = 999_000;

pub const DEFAULT_QUALITY: u32 = 192_000;
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_VOLUME: u8 = 85;
pub const DEFAULT_SPEED: f32 = 1.0;
pub const DEFAULT_LYRIC_DELAY_SECS: f64 = -1.0;

/// Anonymous credential sent as `MUSIC_A` when the jar has no `MUSIC_U`.
pub const DEFAULT_ANONYMOUS_TOKEN: &str = "8aae43f148f990410b9a2af38324af24e87ab9227c9265627ddd10145db744295fcd8701dc45b1ab8985e142f491516295dd965bae848761274a577a62b0fdc54a50284d1e434dcc04ca6d1a52333c9a";

/// Runtime configuration for a player session.
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// Root of all persisted state (`tmp/`, `cache/`).
    pub settings_dir: PathBuf,

    /// Preferred bitrate in bits per second.
    pub music_quality: u32,

    /// Byte budget of the on-disk track cache.
    pub cache_size_bytes: u64,

    /// Output volume, 0..=100.
    pub volume: u8,

    /// Playback rate multiplier.
    pub speed: f32,

    /// Add the domestic `X-Real-IP` header to every request.
    pub foreign: bool,

    /// Use `https` for API calls.
    pub https: bool,

    /// Fallback `MUSIC_A` token.
    pub anonymous_token: String,

    /// Seconds subtracted from the playback position before lyric lookup.
    pub lyric_delay_secs: f64,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("settings_dir", &self.settings_dir)
            .field("music_quality", &self.music_quality)
            .field("cache_size_bytes", &self.cache_size_bytes)
            .field("volume", &self.volume)
            .field("speed", &self.speed)
            .field("foreign", &self.foreign)
            .field("https", &self.https)
            .field("anonymous_token", &"[REDACTED]")
            .field("lyric_delay_secs", &self.lyric_delay_secs)
            .finish()
    }
}

impl SessionConfig {
    /// Creates a new builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Builds a configuration from the process environment.
    ///
    /// `default_settings_dir` is used when `SETTING_DIR` is unset; hosts pass
    /// `bridge_desktop::default_settings_dir()`.
    pub fn from_env(default_settings_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::from_lookup(default_settings_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(default_settings_dir: impl Into<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder().settings_dir(
            lookup("SETTING_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| default_settings_dir.into()),
        );

        if let Some(raw) = lookup("CM_MUSIC_QUALITY") {
            let quality = raw.trim().parse::<u32>().map_err(|e| {
                Error::Config(format!("CM_MUSIC_QUALITY must be a bitrate: {}", e))
            })?;
            builder = builder.music_quality(quality);
        }

        if let Some(raw) = lookup("CM_MUSIC_CACHE_SIZE") {
            let bytes = raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("CM_MUSIC_CACHE_SIZE must be a byte count: {}", e))
            })?;
            builder = builder.cache_size_bytes(bytes);
        }

        if let Some(raw) = lookup("CM_VOLUME") {
            let volume = raw.trim().parse::<u8>().map_err(|e| {
                Error::Config(format!("CM_VOLUME must be an integer 0-100: {}", e))
            })?;
            builder = builder.volume(volume);
        }

        if let Some(raw) = lookup("CM_SPEED") {
            let speed = raw
                .trim()
                .parse::<f32>()
                .map_err(|e| Error::Config(format!("CM_SPEED must be a number: {}", e)))?;
            builder = builder.speed(speed);
        }

        if let Some(raw) = lookup("CM_FOREIGN") {
            builder = builder.foreign(is_truthy(&raw));
        }

        if let Some(raw) = lookup("CM_HTTPS_API") {
            builder = builder.https(raw.trim() != "0");
        }

        if let Some(token) = lookup("CM_ANONYMOUS_TOKEN").filter(|t| !t.is_empty()) {
            builder = builder.anonymous_token(token);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Settings directory is not empty
    /// - Quality is one of [`SUPPORTED_QUALITIES`]
    /// - Cache budget is greater than zero
    /// - Volume is at most 100 and speed is positive
    pub fn validate(&self) -> Result<()> {
        if self.settings_dir.as_os_str().is_empty() {
            return Err(Error::Config("Settings directory cannot be empty".to_string()));
        }

        validate_quality(self.music_quality)?;

        if self.cache_size_bytes == 0 {
            return Err(Error::Config(
                "Cache size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.volume > 100 {
            return Err(Error::Config(format!(
                "Volume must be between 0 and 100, got {}",
                self.volume
            )));
        }

        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(Error::Config(format!(
                "Speed must be a positive number, got {}",
                self.speed
            )));
        }

        if self.anonymous_token.is_empty() {
            return Err(Error::Config("Anonymous token cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Scheme used for API calls.
    pub fn protocol(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    /// Partial downloads of the current and prefetched tracks.
    pub fn tmp_dir(&self) -> PathBuf {
        self.settings_dir.join("tmp")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.settings_dir.join("cache")
    }

    pub fn music_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("music")
    }

    pub fn lyric_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("lyric")
    }

    /// Persisted recency index of the track cache.
    pub fn music_index_path(&self) -> PathBuf {
        self.cache_dir().join("music-list")
    }

    /// All directories the engine writes into.
    pub fn required_dirs(&self) -> [PathBuf; 4] {
        [
            self.tmp_dir(),
            self.cache_dir(),
            self.music_cache_dir(),
            self.lyric_cache_dir(),
        ]
    }

    /// Minimum bytes on disk before a streaming download is handed to the
    /// device: 2 MiB for lossless, 256 KiB otherwise.
    pub fn prebuffer_bytes(&self) -> u64 {
        prebuffer_bytes_for(self.music_quality)
    }
}

/// Pre-buffer gate for a given bitrate.
pub fn prebuffer_bytes_for(quality: u32) -> u64 {
    if quality == LOSSLESS_QUALITY {
        2 * 1024 * 1024
    } else {
        256 * 1024
    }
}

/// Rejects bitrates the remote API does not serve.
pub fn validate_quality(quality: u32) -> Result<()> {
    if SUPPORTED_QUALITIES.contains(&quality) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Music quality must be one of {:?}, got {}",
            SUPPORTED_QUALITIES, quality
        )))
    }
}

fn is_truthy(raw: &str) -> bool {
    let raw = raw.trim();
    !(raw.is_empty() || raw == "0" || raw.eq_ignore_ascii_case("false"))
}

/// Builder for constructing [`SessionConfig`] instances.
///
/// Every field has a default; [`build()`](SessionConfigBuilder::build) only
/// fails when a supplied value is out of range.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    settings_dir: Option<PathBuf>,
    music_quality: Option<u32>,
    cache_size_bytes: Option<u64>,
    volume: Option<u8>,
    speed: Option<f32>,
    foreign: Option<bool>,
    https: Option<bool>,
    anonymous_token: Option<String>,
    lyric_delay_secs: Option<f64>,
}

impl SessionConfigBuilder {
    /// Sets the settings directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::SessionConfig;
    ///
    /// let builder = SessionConfig::builder()
    ///     .settings_dir("/tmp/cloudmusic");
    /// ```
    pub fn settings_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_dir = Some(path.into());
        self
    }

    /// Sets the preferred bitrate.
    ///
    /// Default: 192000
    pub fn music_quality(mut self, quality: u32) -> Self {
        self.music_quality = Some(quality);
        self
    }

    /// Sets the track cache budget in bytes.
    ///
    /// Default: 4 GiB
    pub fn cache_size_bytes(mut self, bytes: u64) -> Self {
        self.cache_size_bytes = Some(bytes);
        self
    }

    /// Sets the output volume.
    ///
    /// Default: 85
    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the playback rate.
    ///
    /// Default: 1.0
    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn foreign(mut self, foreign: bool) -> Self {
        self.foreign = Some(foreign);
        self
    }

    pub fn https(mut self, https: bool) -> Self {
        self.https = Some(https);
        self
    }

    /// Overrides the built-in anonymous token.
    pub fn anonymous_token(mut self, token: impl Into<String>) -> Self {
        self.anonymous_token = Some(token.into());
        self
    }

    /// Sets the lyric delay in seconds.
    ///
    /// Default: -1.0
    pub fn lyric_delay_secs(mut self, delay: f64) -> Self {
        self.lyric_delay_secs = Some(delay);
        self
    }

    /// Builds the final `SessionConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no settings directory was given or a
    /// value fails [`SessionConfig::validate`].
    pub fn build(self) -> Result<SessionConfig> {
        let settings_dir = self.settings_dir.ok_or_else(|| {
            Error::Config(
                "Settings directory is required. \
                 Desktop: use bridge_desktop::default_settings_dir()."
                    .to_string(),
            )
        })?;

        let config = SessionConfig {
            settings_dir,
            music_quality: self.music_quality.unwrap_or(DEFAULT_QUALITY),
            cache_size_bytes: self.cache_size_bytes.unwrap_or(DEFAULT_CACHE_SIZE_BYTES),
            volume: self.volume.unwrap_or(DEFAULT_VOLUME),
            speed: self.speed.unwrap_or(DEFAULT_SPEED),
            foreign: self.foreign.unwrap_or(false),
            https: self.https.unwrap_or(true),
            anonymous_token: self
                .anonymous_token
                .unwrap_or_else(|| DEFAULT_ANONYMOUS_TOKEN.to_string()),
            lyric_delay_secs: self.lyric_delay_secs.unwrap_or(DEFAULT_LYRIC_DELAY_SECS),
        };

        config.validate()?;
        Ok(config)
    }
}
