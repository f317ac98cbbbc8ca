//! # Disk Caches
//!
//! Two independent on-disk stores used by the player:
//!
//! - [`TrackCache`]: completed downloads under a byte budget, evicted least
//!   recently used first, admitted only when the server digest matches.
//! - [`LyricCache`]: parsed lyric tables per track, valid for seven days.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::TrackCache;
//!
//! let cache = TrackCache::new(config.music_cache_dir(), config.music_index_path(), budget);
//! cache.init().await?;
//!
//! if let Some(path) = cache.get("347230").await {
//!     device.load(&path).await?;
//! }
//! ```

pub mod lyric;
pub mod stats;
pub mod track;

pub use lyric::{LyricCache, LYRIC_TTL_MS};
pub use stats::CacheStats;
pub use track::{md5_file, IndexNode, TrackCache};
