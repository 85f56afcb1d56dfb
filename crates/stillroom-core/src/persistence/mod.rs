//! Best-effort remote mirror of session lifecycle events.
//!
//! Local session state is authoritative. Everything here may fail, and a
//! failure only means the backend never learns about (part of) a session.

mod backend;
mod gateway;
mod http;
mod identity;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backend::{BackendCall, InMemoryBackend, RemoteSessionRecord, RemoteStatus, SessionBackend};
pub use gateway::{PersistenceGateway, RetryPolicy};
pub use http::HttpBackend;
pub use identity::{IdentityCell, IdentityProvider, StaticIdentity};

/// Backend-assigned session identifier. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteSessionId(String);

impl RemoteSessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
