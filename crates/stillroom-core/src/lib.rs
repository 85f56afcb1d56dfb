//! # Stillroom Core Library
//!
//! This library provides the core logic for Stillroom, a meditation timer
//! driven by phone orientation: turning the phone face down starts or resumes
//! the session, turning it face up pauses it. It follows a CLI-first
//! philosophy where everything is available through the standalone
//! `stillroom-cli` binary, with any GUI being a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Orientation**: a hysteresis debouncer turning raw vertical-axis
//!   acceleration into discrete FaceDown / FaceUp edges, plus the sensor
//!   source and haptic feedback seams
//! - **Session**: a wall-clock-based state machine and the async controller
//!   that owns it, polls for completion and publishes snapshots
//! - **Persistence**: best-effort remote recording of session start,
//!   completion and cancellation; failures never block the local session
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`OrientationDebouncer`]: hysteresis filter over raw samples
//! - [`SessionMachine`]: core session state machine
//! - [`SessionController`]: single owner task for one live session
//! - [`PersistenceGateway`]: fire-and-forget remote mirror
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod orientation;
pub mod persistence;
pub mod session;
pub mod storage;

pub use error::{
    ConfigError, CoreError, GatewayError, SensorError, SessionError, ValidationError,
};
pub use events::{Event, Trigger};
pub use orientation::{
    EdgeKind, OrientationDebouncer, OrientationEdge, OrientationSample, OrientationSource,
    Thresholds,
};
pub use persistence::{PersistenceGateway, RemoteSessionId};
pub use session::{
    SessionController, SessionInput, SessionMachine, SessionOptions, SessionSnapshot, SessionState,
};
pub use storage::Config;
