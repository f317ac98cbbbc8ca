//! Thread-safety helpers that keep trait bounds aligned with each target.
//!
//! Native hosts share bridge implementations across tokio tasks and need
//! `Send + Sync`. The relayed web host runs on a single thread, so the same
//! bounds become no-ops on `wasm32`.

/// Marker trait that applies `Send + Sync` on native targets while becoming a
/// no-op on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSendSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSendSync for T where T: Send + Sync {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSendSync {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSendSync for T {}

/// Dynamic async reader type that enforces `Send` when available.
#[cfg(not(target_arch = "wasm32"))]
pub type DynAsyncRead = dyn tokio::io::AsyncRead + Send + Unpin;

#[cfg(target_arch = "wasm32")]
pub type DynAsyncRead = dyn tokio::io::AsyncRead + Unpin;
