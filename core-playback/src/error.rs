//! # Playback Error Types
//!
//! Errors raised by the caches, the downloader and the player session.
//! Most of them never leave this crate: the player turns them into
//! `Ended { reason: Failed }` events and carries on.

use std::time::Duration;

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The remote service offered no playable URL for the track.
    #[error("No playable source for track {0}")]
    NoSource(u64),

    /// A remote call made through a host bridge failed.
    #[error("Provider error: {0}")]
    Provider(#[from] BridgeError),

    // ========================================================================
    // Download Errors
    // ========================================================================
    /// Streaming the file to disk failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// Not enough bytes arrived before the pre-buffer deadline.
    #[error("Pre-buffer not reached within {0:?}")]
    PrebufferTimeout(Duration),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Downloaded file does not match the server-declared digest.
    #[error("Integrity check failed: expected md5 {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Cache index or directory operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The playback device rejected a command.
    #[error("Device error: {0}")]
    Device(String),

    /// The player actor is gone.
    #[error("Player is not running")]
    PlayerClosed,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Provider(e) => e.is_transient(),
            PlaybackError::Download(_) | PlaybackError::PrebufferTimeout(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the error came from the network path.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Provider(_)
                | PlaybackError::Download(_)
                | PlaybackError::PrebufferTimeout(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
