use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// Error body returned by the session API. The web API sends `{"error": "..."}`,
/// so `error` is accepted as an alias for `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    #[serde(default = "default_code")]
    pub code: ErrorCode,
    #[serde(alias = "error")]
    pub message: String,
}

fn default_code() -> ErrorCode {
    ErrorCode::Internal
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a raw status and body when the body is not a JSON error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.trim().is_empty() {
            format!("request failed with status {status}")
        } else {
            body
        };
        Self::new(ErrorCode::from_status(status), message)
    }
}

/// A live-channel frame that could not be turned into an inbound event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("event `{0}` is outbound-only")]
    UnexpectedEvent(&'static str),
    #[error("event `{0}` arrived without a payload")]
    EmptyPayload(&'static str),
    #[error("malformed `{event}` payload: {source}")]
    MalformedPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
