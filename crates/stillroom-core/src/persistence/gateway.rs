use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{IdentityProvider, RemoteSessionId, SessionBackend, StaticIdentity};
use crate::error::GatewayError;

/// Bounded wait for an identity token at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// Mirrors session lifecycle to a [`SessionBackend`].
///
/// Nothing here is fatal to the local session: callers get a `Result` for
/// logging and tests, but no failure is retried and none is surfaced to the
/// user. Only the token wait at creation is retried.
#[derive(Clone)]
pub struct PersistenceGateway {
    backend: Option<Arc<dyn SessionBackend>>,
    identity: Arc<dyn IdentityProvider>,
    retry: RetryPolicy,
}

impl PersistenceGateway {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        identity: Arc<dyn IdentityProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend: Some(backend),
            identity,
            retry,
        }
    }

    /// Gateway with no backend; every call is a successful no-op.
    pub fn local_only() -> Self {
        Self {
            backend: None,
            identity: Arc::new(StaticIdentity::anonymous()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn await_token(&self) -> Result<String, GatewayError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(token) = self.identity.token().await {
                return Ok(token);
            }
            if attempt < attempts {
                debug!(attempt, "identity not ready, retrying");
                tokio::time::sleep(self.retry.delay).await;
            }
        }
        Err(GatewayError::Unauthenticated { attempts })
    }

    /// Create the remote record, waiting for sign-in if needed.
    pub async fn try_create_remote_session(
        &self,
        target_secs: u64,
    ) -> Result<RemoteSessionId, GatewayError> {
        let backend = self.backend.as_ref().ok_or(GatewayError::NotConfigured)?;
        let token = self.await_token().await?;
        let id = backend.start_session(&token, target_secs).await?;
        info!(backend = backend.name(), remote_id = %id, "remote session created");
        Ok(id)
    }

    /// Like [`Self::try_create_remote_session`], but failures are logged and
    /// the session continues local-only.
    pub async fn create_remote_session(&self, target_secs: u64) -> Option<RemoteSessionId> {
        match self.try_create_remote_session(target_secs).await {
            Ok(id) => Some(id),
            Err(GatewayError::NotConfigured) => None,
            Err(e) => {
                warn!(error = %e, "session will not be recorded remotely");
                None
            }
        }
    }

    pub async fn complete_remote_session(
        &self,
        id: Option<&RemoteSessionId>,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        let (Some(backend), Some(id)) = (self.backend.as_ref(), id) else {
            return Ok(());
        };
        let result = match self.identity.token().await {
            Some(token) => {
                backend
                    .complete_session(&token, id, actual_secs, interruption_count)
                    .await
            }
            None => Err(GatewayError::Unauthenticated { attempts: 1 }),
        };
        if let Err(e) = &result {
            warn!(remote_id = %id, error = %e, "failed to mark remote session completed");
        }
        result
    }

    pub async fn cancel_remote_session(
        &self,
        id: Option<&RemoteSessionId>,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        let (Some(backend), Some(id)) = (self.backend.as_ref(), id) else {
            return Ok(());
        };
        let result = match self.identity.token().await {
            Some(token) => {
                backend
                    .cancel_session(&token, id, actual_secs, interruption_count)
                    .await
            }
            None => Err(GatewayError::Unauthenticated { attempts: 1 }),
        };
        if let Err(e) = &result {
            warn!(remote_id = %id, error = %e, "failed to mark remote session cancelled");
        }
        result
    }
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("retry", &self.retry)
            .finish()
    }
}
