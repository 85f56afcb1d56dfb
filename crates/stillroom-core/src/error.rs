//! Core error types for stillroom-core.
//!
//! Nothing in this hierarchy is fatal to a running session: the session
//! controller logs gateway and sensor failures and keeps the local timer
//! authoritative. These types exist so callers (the CLI, tests, an embedding
//! UI) can still see what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stillroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Remote persistence errors
    #[error("Persistence error: {0}")]
    Gateway(#[from] GatewayError),

    /// Orientation sensor errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Session controller errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dotted configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Home/config directory could not be resolved or created
    #[error("Configuration directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Session target must be a positive duration
    #[error("target duration must be greater than zero")]
    ZeroTarget,

    /// The enter/exit thresholds do not form a hysteresis band
    #[error(
        "face-up threshold ({face_up}) must be below face-down threshold ({face_down}), \
         both within [-1, 1]"
    )]
    InvalidThresholds { face_down: f64, face_up: f64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Remote persistence errors.
///
/// Every variant is recoverable: the session keeps running locally.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No remote backend configured
    #[error("remote persistence is not configured")]
    NotConfigured,

    /// Identity token never became available
    #[error("identity token unavailable after {attempts} attempts")]
    Unauthenticated { attempts: u32 },

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Backend answered with something we cannot interpret
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Backend rejected the call for a domain reason (unknown session, etc.)
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Orientation sensor errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The device has no usable orientation sensor
    #[error("orientation sensor is not available")]
    Unavailable,

    /// The source refused the subscription
    #[error("failed to subscribe to orientation sensor: {0}")]
    SubscribeFailed(String),
}

/// Session controller errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session already reached a terminal state or was torn down
    #[error("session is closed")]
    Closed,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            GatewayError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            GatewayError::MalformedResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ConfigError {
    fn from(err: url::ParseError) -> Self {
        ConfigError::InvalidValue {
            key: "remote.base_url".into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
