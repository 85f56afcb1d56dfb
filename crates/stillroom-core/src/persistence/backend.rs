use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RemoteSessionId;
use crate::error::GatewayError;

/// Remote store for session records.
///
/// Implementations are stateless with respect to the local session: the
/// caller passes the token and the id on every call.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short identifier used in logs (e.g. "http", "memory").
    fn name(&self) -> &str;

    async fn start_session(
        &self,
        token: &str,
        target_secs: u64,
    ) -> Result<RemoteSessionId, GatewayError>;

    async fn complete_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError>;

    async fn cancel_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSessionRecord {
    pub id: RemoteSessionId,
    pub target_secs: u64,
    pub actual_secs: u64,
    pub interruption_count: u32,
    pub status: RemoteStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One call as seen by [`InMemoryBackend`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start { target_secs: u64 },
    Complete { id: RemoteSessionId, actual_secs: u64, interruption_count: u32 },
    Cancel { id: RemoteSessionId, actual_secs: u64, interruption_count: u32 },
}

/// Process-local backend, used offline and in tests.
///
/// `set_offline(true)` makes every call fail with a network error.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    records: Mutex<HashMap<RemoteSessionId, RemoteSessionRecord>>,
    calls: Mutex<Vec<BackendCall>>,
    offline: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses every call.
    pub fn offline() -> Self {
        let backend = Self::default();
        backend.set_offline(true);
        backend
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn record(&self, id: &RemoteSessionId) -> Option<RemoteSessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    fn log(&self, call: BackendCall) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("backend offline".into()));
        }
        Ok(())
    }

    fn finish(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
        status: RemoteStatus,
    ) -> Result<(), GatewayError> {
        if token.is_empty() {
            return Err(GatewayError::Status {
                status: 401,
                message: "User not authenticated".into(),
            });
        }
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = records
            .get_mut(id)
            .ok_or_else(|| GatewayError::Rejected(format!("session {id} not found")))?;
        record.actual_secs = actual_secs;
        record.interruption_count = interruption_count;
        record.status = status;
        record.ended_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start_session(
        &self,
        token: &str,
        target_secs: u64,
    ) -> Result<RemoteSessionId, GatewayError> {
        self.log(BackendCall::Start { target_secs })?;
        if token.is_empty() {
            return Err(GatewayError::Status {
                status: 401,
                message: "User not authenticated".into(),
            });
        }
        let id = RemoteSessionId::new(uuid::Uuid::new_v4().to_string());
        let record = RemoteSessionRecord {
            id: id.clone(),
            target_secs,
            actual_secs: 0,
            interruption_count: 0,
            status: RemoteStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), record);
        Ok(id)
    }

    async fn complete_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        self.log(BackendCall::Complete {
            id: id.clone(),
            actual_secs,
            interruption_count,
        })?;
        self.finish(token, id, actual_secs, interruption_count, RemoteStatus::Completed)
    }

    async fn cancel_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        self.log(BackendCall::Cancel {
            id: id.clone(),
            actual_secs,
            interruption_count,
        })?;
        self.finish(token, id, actual_secs, interruption_count, RemoteStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_then_complete_updates_record() {
        let backend = InMemoryBackend::new();
        let id = backend.start_session("tok", 600).await.unwrap();
        backend.complete_session("tok", &id, 600, 2).await.unwrap();

        let record = backend.record(&id).unwrap();
        assert_eq!(record.status, RemoteStatus::Completed);
        assert_eq!(record.actual_secs, 600);
        assert_eq!(record.interruption_count, 2);
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let backend = InMemoryBackend::new();
        let err = backend
            .cancel_session("tok", &RemoteSessionId::new("nope"), 1, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn offline_backend_logs_and_fails() {
        let backend = InMemoryBackend::offline();
        assert!(matches!(
            backend.start_session("tok", 60).await,
            Err(GatewayError::Network(_))
        ));
        assert_eq!(backend.calls(), vec![BackendCall::Start { target_secs: 60 }]);
    }
}
