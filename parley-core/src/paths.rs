//! Filesystem locations used by the relay and client.

use std::path::PathBuf;

const APP_DIR: &str = "parley";

/// `<config dir>/parley`, or `/tmp/parley` when the platform has none.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

/// `<data dir>/parley`, falling back to the config directory.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(config_dir)
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

pub fn default_database_path() -> PathBuf {
    data_dir().join("server.db3")
}

/// Log file for a binary, e.g. `server.log`.
pub fn log_path(file_name: &str) -> PathBuf {
    config_dir().join(file_name)
}
