//! Session engine façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, playback
//! device, clock) into the engine components and exposes them through one
//! owned [`CoreService`]. The UI process talks to it exclusively through
//! [`ControlMessage`]s and the [`EventBus`](core_runtime::events::EventBus).
//! Desktop hosts typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod control;
pub mod error;
pub mod service;

pub use control::{ControlMessage, ControlReply};
pub use error::{CoreError, Result};
pub use service::{CoreDependencies, CoreService};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use std::sync::Arc;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use bridge_traits::playback::PlaybackDevice;
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use core_runtime::config::SessionConfig;
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use provider_netease::Cookie;

/// Convenience bootstrapper for desktop hosts.
///
/// Loads the configuration from the environment, falling back to the
/// platform settings directory, and uses `reqwest` for HTTP. Logging is the
/// host's business: call `core_runtime::logging::init_logging` first.
///
/// ```ignore
/// use core_service::{bootstrap_desktop, ControlMessage};
///
/// let core = bootstrap_desktop(device, persisted_cookie).await?;
/// core.handle(ControlMessage::FmNext).await?;
/// ```
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(
    device: Arc<dyn PlaybackDevice>,
    cookie: Option<Cookie>,
) -> Result<CoreService> {
    let config = SessionConfig::from_env(bridge_desktop::default_settings_dir())?;
    let http = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    CoreService::init(config, CoreDependencies::new(Arc::new(http), device), cookie).await
}
