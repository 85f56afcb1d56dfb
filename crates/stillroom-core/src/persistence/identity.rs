use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

/// Source of the bearer token used for remote calls.
///
/// Sign-in completes asynchronously and may lag app start, so `None` means
/// "not yet", not "never".
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// Fixed token (or fixed absence of one).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    /// Token from an environment variable; empty values count as absent.
    pub fn from_env(var: &str) -> Self {
        Self(std::env::var(var).ok().filter(|token| !token.is_empty()))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token slot filled in later by the auth layer.
#[derive(Debug, Clone)]
pub struct IdentityCell {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl IdentityCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.tx.send_replace(Some(token.into()));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for IdentityCell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for IdentityCell {
    async fn token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }
}
