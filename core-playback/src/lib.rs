//! # Playback Session Module
//!
//! Drives a playback device through the lifetime of a listening session.
//!
//! ## Overview
//!
//! This module handles:
//! - The player actor: load generations, polling, lyric cursors, prefetch
//!   and scrobbling
//! - Streaming downloads with a pre-buffer gate
//! - The LRU track cache and the lyric cache
//! - The personal FM queue
//! - A relayed playback device for engines living in a web view

pub mod cache;
pub mod config;
pub mod device;
pub mod download;
pub mod error;
pub mod fm;
pub mod player;

pub use cache::{CacheStats, LyricCache, TrackCache};
pub use config::{PlayerConfig, PlayerState};
pub use device::{DeviceCommand, DeviceReport, RelayDevice};
pub use download::{CacheTarget, DownloadRequest, Downloader};
pub use error::{PlaybackError, Result};
pub use fm::PersonalFm;
pub use player::{Player, PlayerDeps, PlayerHandle, PlayerSnapshot, TrackDescriptor};
