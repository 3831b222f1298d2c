use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use super::transport::TransportError;

/// Why an authorization failure could not be recovered.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("token refresh was rejected")]
    RefreshRejected,

    #[error("token refresh was abandoned before it settled")]
    RefreshAbandoned,

    #[error("session ended while the request was in flight")]
    SessionEnded,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed, please log in again ({0})")]
    Auth(AuthFailure),

    #[error("{message}")]
    Http {
        status: StatusCode,
        message: String,
        body: Value,
    },

    #[error("Network error, please check your connection: {0}")]
    Network(#[source] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for raw response bodies echoed into logs
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    /// Classify a non-success response.
    ///
    /// The body is parsed as JSON when possible and replaced with `{}`
    /// otherwise. A `message` field in the body becomes the error message.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let body: Value = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::Object(Default::default()));

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            });

        ApiError::Http { status, message, body }
    }

    /// HTTP status for `Http` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}
