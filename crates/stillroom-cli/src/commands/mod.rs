pub mod config;
pub mod session;

use std::path::{Path, PathBuf};

use stillroom_core::{Config, ConfigError};

/// `--config` if given, the default location otherwise.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::path(),
    }
}
