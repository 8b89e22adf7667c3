//! Path resolution for metronome-sync
//!
//! # Environment Variables
//!
//! - `METRONOME_SYNC_CONFIG_DIR` - Override config directory
//! - `METRONOME_SYNC_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `METRONOME_SYNC_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/metronome-sync` (if set)
//! 3. `~/.config/metronome-sync`
//!
//! For state_dir():
//! 1. `METRONOME_SYNC_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/metronome-sync` (if set)
//! 3. `~/.local/state/metronome-sync`

use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "metronome-sync";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "METRONOME_SYNC_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "METRONOME_SYNC_STATE_DIR";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of a file in the config directory
pub fn config_file(name: &str) -> Result<PathBuf> {
    Ok(config_dir()?.join(name))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
