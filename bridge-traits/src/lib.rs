//! # Host Bridge Traits
//!
//! Capability traits that the session engine consumes and that each host
//! provides.
//!
//! ## Overview
//!
//! The engine never talks to the network, the audio output or the wall clock
//! directly. Every such capability is described here as a trait, so the
//! desktop host, a relayed web host and the test suites can each plug in
//! their own implementation.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Form/JSON requests and streaming downloads
//!
//! ### Playback
//! - [`PlaybackDevice`](playback::PlaybackDevice) - Opaque audio device driven by the player
//!
//! ### Remote catalogue
//! - [`MusicProvider`](music::MusicProvider) - Song URLs, lyrics, scrobbles and the FM feed
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Bridge implementations report failures through
//! [`BridgeError`](error::BridgeError). Higher layers wrap it in their own
//! error enums and decide whether the failure is recoverable.
//!
//! ## Thread Safety
//!
//! Traits are bounded by [`PlatformSendSync`](platform::PlatformSendSync),
//! which is `Send + Sync` on native targets and a no-op on `wasm32`.
//!
//! ## Examples
//!
//! ### Implementing PlaybackDevice
//!
//! ```ignore
//! use bridge_traits::playback::PlaybackDevice;
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//! use std::path::Path;
//!
//! pub struct NullDevice;
//!
//! #[async_trait]
//! impl PlaybackDevice for NullDevice {
//!     async fn is_empty(&self) -> bool { true }
//!     async fn load(&self, _path: &Path) -> Result<bool> { Ok(true) }
//!     async fn play(&self) -> Result<bool> { Ok(true) }
//!     async fn pause(&self) -> Result<()> { Ok(()) }
//!     async fn stop(&self) -> Result<()> { Ok(()) }
//!     async fn position(&self) -> f64 { 0.0 }
//!     async fn set_volume(&self, _level: u8) -> Result<()> { Ok(()) }
//! }
//! ```

pub mod error;
pub mod http;
pub mod music;
pub mod platform;
pub mod playback;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use music::{LyricData, LyricLine, MusicProvider, SongUrl, TrackItem};
pub use playback::PlaybackDevice;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, StderrLogger, SystemClock};
