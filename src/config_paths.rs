//! Where vtl-preview keeps its files
//!
//! Everything lives under `$XDG_CONFIG_HOME/vtl-preview/` (falling back to
//! `~/.config/vtl-preview/`), or `%APPDATA%\vtl-preview\` on Windows.

use std::path::PathBuf;

const APP_DIR: &str = "vtl-preview";

/// Base name of the rotated log files
pub const LOG_FILE_PREFIX: &str = "vtl-preview.log";

/// Base config directory
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);

    #[cfg(not(target_os = "windows"))]
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")));

    base.map(|dir| dir.join(APP_DIR))
}

/// `config.yaml` inside [`config_dir`]
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.yaml"))
}

/// `logs/` inside [`config_dir`]
pub fn logs_dir() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("logs"))
}
