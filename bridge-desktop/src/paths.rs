//! Settings directory resolution.

use std::path::PathBuf;

/// Directory name created under the user's home directory.
pub const SETTINGS_DIR_NAME: &str = ".cloudmusic";

/// `~/.cloudmusic`, falling back to the working directory when no home
/// directory can be determined.
pub fn default_settings_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_DIR_NAME)
}
