//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls and gzip
//! - Settings-directory resolution using `dirs`
//!
//! The audio device is injected by the host process and is not provided here.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_settings_dir, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = default_settings_dir();
//!     // Hand both to the core service builder
//!     Ok(())
//! }
//! ```

mod http;
mod paths;

pub use http::ReqwestHttpClient;
pub use paths::{default_settings_dir, SETTINGS_DIR_NAME};
