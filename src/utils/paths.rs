//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "theory-cascade";

/// Get the platform configuration directory (e.g. ~/.config on Linux)
pub fn config_root() -> AppResult<PathBuf> {
    dirs::config_dir().ok_or_else(|| AppError::config("Could not determine config directory"))
}

/// Get the application directory (<config>/theory-cascade/)
pub fn app_dir() -> AppResult<PathBuf> {
    Ok(config_root()?.join(APP_DIR_NAME))
}

/// Get the config file path (<config>/theory-cascade/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure the parent directory of a file path exists
pub fn ensure_parent_dir(path: &Path) -> AppResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
