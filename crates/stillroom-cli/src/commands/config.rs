use std::path::Path;

use clap::Subcommand;
use stillroom_core::error::Result;
use stillroom_core::{Config, ConfigError};

use super::config_path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dotted config key (e.g. "session.default_target_secs", "sensor.haptics")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dotted config key
        key: String,
        /// New value (empty string clears optional values)
        value: String,
    },
    /// List all config values
    List {
        /// Print the whole config as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset config to defaults
    Reset,
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction, config: Option<&Path>) -> Result<()> {
    let path = config_path(config)?;
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load_from(&path)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(ConfigError::UnknownKey(key).into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            println!("ok");
        }
        ConfigAction::List { json } => {
            let config = Config::load_from(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for (key, value) in config.entries() {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            Config::default().save_to(&path)?;
            println!("config reset to defaults");
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
