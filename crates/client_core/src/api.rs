//! Read side of the session REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ResourceSlug, Session, SessionId},
    error::ApiError,
    protocol::StoredMessage,
};
use tracing::debug;

#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn get_session(&self, scope: &ResourceSlug, session_id: &SessionId) -> Result<Session>;
    /// Stored history for the session, unwrapped by the caller.
    async fn get_messages(
        &self,
        scope: &ResourceSlug,
        session_id: &SessionId,
    ) -> Result<Vec<StoredMessage>>;
}

#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    http: Client,
    server_url: String,
}

impl HttpSessionApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn session_url(&self, scope: &ResourceSlug, session_id: &SessionId) -> String {
        format!("{}/{scope}/session/{session_id}.json", self.server_url)
    }

    pub fn messages_url(&self, scope: &ResourceSlug, session_id: &SessionId) -> String {
        format!("{}/{scope}/session/{session_id}/messages.json", self.server_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "history: GET");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let res = check_status(res).await?;
        res.json()
            .await
            .with_context(|| format!("invalid response body from {url}"))
    }
}

/// Turns a non-2xx response into an [`ApiError`], reading `{"error": ...}`
/// bodies when the server sends one.
async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let url = res.url().to_string();
    let body = res.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body)
        .unwrap_or_else(|_| ApiError::from_status(status.as_u16(), body));
    Err(anyhow::Error::new(error).context(format!("{url} returned {status}")))
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn get_session(&self, scope: &ResourceSlug, session_id: &SessionId) -> Result<Session> {
        self.get_json(&self.session_url(scope, session_id)).await
    }

    async fn get_messages(
        &self,
        scope: &ResourceSlug,
        session_id: &SessionId,
    ) -> Result<Vec<StoredMessage>> {
        self.get_json(&self.messages_url(scope, session_id)).await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
