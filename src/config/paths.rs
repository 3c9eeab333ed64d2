//! Default configuration file location
//!
//! ## Resolution Order
//!
//! 1. `HEGEMON_CONFIG` environment variable (if set)
//! 2. `<user config dir>/hegemon/config.json` (`~/.config` on Linux,
//!    `~/Library/Application Support` on macOS, `%APPDATA%` on Windows)

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::HegemonError;

/// Environment variable that overrides the default config path
pub const CONFIG_ENV_VAR: &str = "HEGEMON_CONFIG";

/// Resolve the default configuration file path
///
/// # Errors
///
/// Returns an error if the user's config directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf, HegemonError> {
    if let Ok(custom) = std::env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(custom));
    }

    let base = BaseDirs::new()
        .ok_or_else(|| HegemonError::config("Could not determine user config directory"))?;
    Ok(base.config_dir().join("hegemon").join("config.json"))
}
