//! # Netease Provider
//!
//! Client for the encrypted cloud-music API.
//!
//! ## Overview
//!
//! This crate provides:
//! - The two request encryption modes (`weapi`, `eapi`) plus plain requests
//! - A single-writer cookie jar broadcasting every change
//! - A TTL response cache
//! - The endpoint calls the player needs, exposed as a `MusicProvider`
//!
//! ## Usage
//!
//! ```ignore
//! use provider_netease::{ApiSettings, CookieStore, NeteaseApi};
//!
//! let api = NeteaseApi::new(http_client, ApiSettings::from_config(&config), CookieStore::new());
//! let url = api.song_url(186016, 320_000).await?;
//! ```

pub mod api;
pub mod cache;
pub mod cookie;
pub mod crypto;
pub mod error;
pub mod lyric;
pub mod provider;
pub mod request;
pub mod types;

pub use api::{quality_level, NeteaseApi};
pub use cache::ResponseCache;
pub use cookie::{Cookie, CookieStore};
pub use error::{NeteaseError, Result};
pub use request::{ApiSettings, NeteaseClient};
pub use types::{PlaylistItem, Profile};
