use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A settings, cache or temp directory could not be created.
    #[error("Startup failed: cannot create {path}: {source}")]
    Startup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("API error: {0}")]
    Api(#[from] provider_netease::NeteaseError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
