//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the session engine:
//! - Logging and tracing infrastructure
//! - Session configuration and environment loading
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration type,
//! its event vocabulary and the logging conventions used throughout.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
