//! TOML-based application configuration.
//!
//! Stores:
//! - Session defaults (target duration, poll interval, teardown flush timeout)
//! - Orientation sensor settings (sampling rate, hysteresis thresholds, haptics)
//! - Remote persistence endpoint and auth retry budget
//!
//! Configuration is stored at `~/.config/stillroom/config.toml`.
//! The identity token is never written here; it is read from `STILLROOM_TOKEN`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::data_dir;
use crate::error::{ConfigError, ValidationError};
use crate::orientation::Thresholds;
use crate::persistence::{HttpBackend, IdentityProvider, PersistenceGateway, RetryPolicy};
use crate::session::SessionOptions;

/// Environment variable holding the bearer token for remote persistence.
pub const TOKEN_ENV_VAR: &str = "STILLROOM_TOKEN";

/// Session defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_target_secs")]
    pub default_target_secs: u64,
    #[serde(default = "default_100")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

/// Orientation sensor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_100")]
    pub sampling_interval_ms: u64,
    #[serde(default = "default_face_down")]
    pub face_down_threshold: f64,
    #[serde(default = "default_face_up")]
    pub face_up_threshold: f64,
    #[serde(default = "default_true")]
    pub haptics: bool,
}

/// Remote persistence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Unset (or empty) keeps every session local.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_auth_retry_attempts")]
    pub auth_retry_attempts: u32,
    #[serde(default = "default_auth_retry_delay_ms")]
    pub auth_retry_delay_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/stillroom/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

// Default functions
fn default_target_secs() -> u64 {
    1200
}
fn default_100() -> u64 {
    100
}
fn default_flush_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_face_down() -> f64 {
    crate::orientation::FACE_DOWN_THRESHOLD
}
fn default_face_up() -> f64 {
    crate::orientation::FACE_UP_THRESHOLD
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_auth_retry_attempts() -> u32 {
    5
}
fn default_auth_retry_delay_ms() -> u64 {
    500
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_target_secs: default_target_secs(),
            tick_interval_ms: 100,
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_interval_ms: 100,
            face_down_threshold: default_face_down(),
            face_up_threshold: default_face_up(),
            haptics: true,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            auth_retry_attempts: default_auth_retry_attempts(),
            auth_retry_delay_ms: default_auth_retry_delay_ms(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    invalid(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) => return Err(unknown()),
                    // Optional strings: empty clears.
                    serde_json::Value::Null | serde_json::Value::String(_) if value.is_empty() => {
                        serde_json::Value::Null
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location, `<data_dir>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, fails
    /// validation, or the defaults cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
                cfg.validate().map_err(|e| load_failed(e.to_string()))?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(load_failed(e.to_string())),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. The caller saves.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config fails validation. `self` is untouched on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        *self = updated;
        Ok(())
    }

    /// Flattened `key = value` pairs, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session.default_target_secs == 0 {
            return Err(ValidationError::ZeroTarget);
        }
        for (field, value) in [
            ("session.tick_interval_ms", self.session.tick_interval_ms),
            ("sensor.sampling_interval_ms", self.sensor.sampling_interval_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        self.thresholds()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidThresholds`] if the pair does not form a band.
    pub fn thresholds(&self) -> Result<Thresholds, ValidationError> {
        Thresholds::new(self.sensor.face_down_threshold, self.sensor.face_up_threshold)
    }

    /// Options for one session; `target_secs` overrides the configured default.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is zero or the thresholds are invalid.
    pub fn session_options(
        &self,
        target_secs: Option<u64>,
    ) -> Result<SessionOptions, ValidationError> {
        let target_secs = target_secs.unwrap_or(self.session.default_target_secs);
        if target_secs == 0 {
            return Err(ValidationError::ZeroTarget);
        }
        Ok(SessionOptions {
            target_secs,
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            sampling_interval: Duration::from_millis(self.sensor.sampling_interval_ms),
            thresholds: self.thresholds()?,
            flush_timeout: Duration::from_millis(self.session.flush_timeout_ms),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.remote.auth_retry_attempts,
            delay: Duration::from_millis(self.remote.auth_retry_delay_ms),
        }
    }

    /// HTTP-backed gateway when `remote.base_url` is set, local-only otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if `remote.base_url` is not a valid absolute URL.
    pub fn gateway(
        &self,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<PersistenceGateway, ConfigError> {
        let Some(base_url) = self.remote.base_url.as_deref().filter(|url| !url.is_empty()) else {
            return Ok(PersistenceGateway::local_only());
        };
        let backend = HttpBackend::new(
            base_url,
            Duration::from_millis(self.remote.request_timeout_ms),
        )?;
        Ok(PersistenceGateway::new(
            Arc::new(backend),
            identity,
            self.retry_policy(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::StaticIdentity;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.session.default_target_secs, 1200);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[sensor]\nhaptics = false\n").unwrap();
        assert!(!parsed.sensor.haptics);
        assert_eq!(parsed.sensor.face_down_threshold, 0.7);
        assert_eq!(parsed.remote.auth_retry_attempts, 5);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sensor.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("session.default_target_secs").as_deref(), Some("1200"));
        assert_eq!(cfg.get("sensor.face_up_threshold").as_deref(), Some("0.3"));
        assert_eq!(cfg.get("remote.base_url").as_deref(), Some("null"));
        assert!(cfg.get("sensor.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("sensor.haptics", "false").unwrap();
        cfg.set("session.default_target_secs", "600").unwrap();
        cfg.set("sensor.face_down_threshold", "0.8").unwrap();
        cfg.set("remote.base_url", "https://api.example.com").unwrap();

        assert!(!cfg.sensor.haptics);
        assert_eq!(cfg.session.default_target_secs, 600);
        assert_eq!(cfg.sensor.face_down_threshold, 0.8);
        assert_eq!(cfg.remote.base_url.as_deref(), Some("https://api.example.com"));

        cfg.set("remote.base_url", "").unwrap();
        assert_eq!(cfg.remote.base_url, None);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("sensor.nonexistent_key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("sensor", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(cfg.set("", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        let result = cfg.set("sensor.enabled", "not_a_bool");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn set_rejects_collapsed_band_and_leaves_config_untouched() {
        let mut cfg = Config::default();
        let result = cfg.set("sensor.face_up_threshold", "0.9");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(cfg, Config::default());

        assert!(cfg.set("session.default_target_secs", "0").is_err());
    }

    #[test]
    fn entries_are_flat_and_sorted() {
        let entries = Config::default().entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"remote.auth_retry_attempts"));
        assert!(keys.contains(&"sensor.face_down_threshold"));
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.set("remote.auth_retry_delay_ms", "250").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.remote.auth_retry_delay_ms, 250);
        assert_eq!(loaded.retry_policy().delay, Duration::from_millis(250));
    }

    #[test]
    fn load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sensor]\nface_down_threshold = 0.1\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn session_options_honour_override() {
        let cfg = Config::default();
        let options = cfg.session_options(Some(90)).unwrap();
        assert_eq!(options.target_secs, 90);
        assert_eq!(options.tick_interval, Duration::from_millis(100));
        assert_eq!(cfg.session_options(None).unwrap().target_secs, 1200);
        assert_eq!(cfg.session_options(Some(0)), Err(ValidationError::ZeroTarget));
    }

    #[test]
    fn gateway_is_local_only_without_base_url() {
        let cfg = Config::default();
        let gateway = cfg.gateway(Arc::new(StaticIdentity::anonymous())).unwrap();
        assert!(!gateway.is_configured());
    }

    #[test]
    fn gateway_uses_http_when_base_url_set() {
        let mut cfg = Config::default();
        cfg.set("remote.base_url", "https://api.example.com/v1").unwrap();
        let gateway = cfg.gateway(Arc::new(StaticIdentity::new("t"))).unwrap();
        assert!(gateway.is_configured());
        assert_eq!(gateway.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn gateway_rejects_bad_url() {
        let mut cfg = Config::default();
        cfg.remote.base_url = Some("not a url".into());
        assert!(matches!(
            cfg.gateway(Arc::new(StaticIdentity::anonymous())),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
