//! Workspace umbrella crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-service`, `core-playback`, `provider-netease`). Host
//! applications can depend on `cloudmusic-workspace` and enable the documented
//! features without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service;

#[cfg(feature = "playback")]
pub use core_playback;

#[cfg(feature = "netease")]
pub use provider_netease;
