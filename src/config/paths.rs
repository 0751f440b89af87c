//! Data directory paths, under the platform config dir:
//! `%APPDATA%` on Windows, `~/Library/Application Support` on macOS,
//! `$XDG_CONFIG_HOME` (or `~/.config`) elsewhere.

use std::path::PathBuf;

const APP_DIR: &str = "promptdj";

/// Get the PromptDJ data directory (cross-platform).
pub fn get_data_dir() -> PathBuf {
    get_config_base().join(APP_DIR).join("data")
}

/// Rotating log files live here.
pub fn get_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Default destination for saved recordings.
pub fn get_recordings_dir() -> PathBuf {
    get_data_dir().join("recordings")
}

/// Per-user config base from `dirs`, or `~/.config` when the platform has none.
fn get_config_base() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
}
