//! Playback device bridge.
//!
//! The player treats the audio engine as an opaque device: it hands over a
//! file path, toggles play/pause, and polls position and emptiness. The
//! decoder behind it is entirely the host's business.

use std::path::Path;

use crate::{error::Result, platform::PlatformSendSync};

/// Opaque audio output driven by the player session.
///
/// Implementations exist for a host-native engine and for a relayed engine
/// living in a web view (`core_playback::device::RelayDevice`).
///
/// # Contract
///
/// - `is_empty` turns `true` once the loaded track has finished or was
///   stopped; the player reads it on every poll to detect a natural end.
/// - `load` returns `Ok(false)` when the device rejects the file (unsupported
///   format, truncated data). Transport failures are `Err`.
/// - `position` is the playback head in seconds.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait PlaybackDevice: PlatformSendSync {
    /// Whether nothing is loaded or the loaded track has ended.
    async fn is_empty(&self) -> bool;

    /// Load the file at `path`, replacing whatever was loaded.
    async fn load(&self, path: &Path) -> Result<bool>;

    /// Start or resume playback. Returns `false` when nothing can play.
    async fn play(&self) -> Result<bool>;

    async fn pause(&self) -> Result<()>;

    /// Stop and unload.
    async fn stop(&self) -> Result<()>;

    /// Current position in seconds.
    async fn position(&self) -> f64;

    /// Output volume, 0..=100.
    async fn set_volume(&self, level: u8) -> Result<()>;

    /// Seek by `offset` seconds relative to the current position.
    async fn seek(&self, offset: f64) -> Result<()> {
        let _ = offset;
        Ok(())
    }

    /// Playback rate multiplier.
    async fn set_speed(&self, speed: f32) -> Result<()> {
        let _ = speed;
        Ok(())
    }

    /// Whether the device can start on a file that is still being written.
    ///
    /// Native decoders stream from a growing temp file; a relayed device must
    /// receive the complete file before `load`.
    fn streams_partial_files(&self) -> bool {
        true
    }
}
