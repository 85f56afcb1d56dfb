mod config;

pub use config::{Config, RemoteConfig, SensorConfig, SessionConfig, TOKEN_ENV_VAR};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/stillroom[-dev]/` based on STILLROOM_ENV.
///
/// Set STILLROOM_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STILLROOM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("stillroom-dev")
    } else {
        base_dir.join("stillroom")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DirectoryUnavailable(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
