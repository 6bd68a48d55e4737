//! Configuration and result paths
//!
//! All locations come from the directories crate so they follow the platform
//! conventions (XDG on Linux).

use std::io;
use std::path::PathBuf;

/// Project name used for every per-user directory
const PROJECT_NAME: &str = "vm-scenario";

/// Get the configuration directory path
///
/// - Linux: `~/.config/vm-scenario/`
/// - macOS: `~/Library/Application Support/vm-scenario/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default directory for keyval result files
///
/// Falls back to `./results` when no home directory can be determined.
pub fn results_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.data_dir().join("results"))
        .unwrap_or_else(|| PathBuf::from("results"))
}

/// Ensure a directory exists, creating parents as needed
pub fn ensure_dir(dir: &std::path::Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
