//! JSON-over-HTTP session backend.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | call | request body | response |
//! |---|---|---|
//! | `POST sessions/start` | `{targetDuration}` | `{sessionId}` |
//! | `POST sessions/complete` | `{sessionId, actualDuration, interruptions}` | `{success}` |
//! | `POST sessions/cancel` | `{sessionId, actualDuration, interruptions}` | `{success}` |
//!
//! Durations are whole seconds. Every call carries the identity token as a
//! bearer credential.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{RemoteSessionId, SessionBackend};
use crate::error::{ConfigError, GatewayError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    target_duration: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishSessionRequest<'a> {
    session_id: &'a str,
    actual_duration: u64,
    interruptions: u32,
}

#[derive(Deserialize)]
struct FinishSessionResponse {
    success: bool,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let mut base_url = Url::parse(base_url)?;
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "remote".into(),
                message: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Network(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<B, R>(&self, path: &str, token: &str, body: &B) -> Result<R, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<R>().await?)
    }

    async fn finish(
        &self,
        path: &str,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        let body = FinishSessionRequest {
            session_id: id.as_str(),
            actual_duration: actual_secs,
            interruptions: interruption_count,
        };
        let response: FinishSessionResponse = self.post(path, token, &body).await?;
        if response.success {
            Ok(())
        } else {
            Err(GatewayError::Rejected(format!("{path} reported failure")))
        }
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_session(
        &self,
        token: &str,
        target_secs: u64,
    ) -> Result<RemoteSessionId, GatewayError> {
        let body = StartSessionRequest {
            target_duration: target_secs,
        };
        let response: StartSessionResponse = self.post("sessions/start", token, &body).await?;
        if response.session_id.is_empty() {
            return Err(GatewayError::MalformedResponse("empty sessionId".into()));
        }
        Ok(RemoteSessionId::new(response.session_id))
    }

    async fn complete_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        self.finish("sessions/complete", token, id, actual_secs, interruption_count)
            .await
    }

    async fn cancel_session(
        &self,
        token: &str,
        id: &RemoteSessionId,
        actual_secs: u64,
        interruption_count: u32,
    ) -> Result<(), GatewayError> {
        self.finish("sessions/cancel", token, id, actual_secs, interruption_count)
            .await
    }
}
