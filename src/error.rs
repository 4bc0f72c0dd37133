//! Apertus Error Types
//!
//! Error handling for the Apertus client, including the mapping from
//! non-success HTTP responses to [`ApiError`].

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for Apertus operations
#[derive(Debug, Error)]
pub enum ApertusError {
    /// No credential available, or the client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required request argument is missing or empty
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The remote service answered with a non-2xx status
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A stream produced frames but none of them could be decoded
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Connection-level failure, or a success response that could not be decoded
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApertusError {
    /// HTTP status code, if the error came from the remote service
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApertusError::Api(err) => Some(err.status_code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApertusError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApertusError::Transport(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ApertusError::Transport(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ApertusError::Transport(format!("Failed to decode response: {}", err))
        } else if err.is_builder() {
            ApertusError::Config(format!("Failed to build request: {}", err))
        } else {
            ApertusError::Transport(err.to_string())
        }
    }
}

/// Error returned by the remote service for a non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Apertus API error {status_code}: {message}")]
pub struct ApiError {
    /// HTTP status code
    pub status_code: u16,

    /// Message from the response body, or the status line text
    pub message: String,

    /// URL of the failed request
    pub url: String,

    /// Raw response body, kept whether or not it parsed as JSON
    pub payload: Option<String>,
}

impl ApiError {
    /// Build an error from the parts of a failed response.
    ///
    /// The message is taken from `error.message`, a string `error`, a
    /// top-level `message` or `detail` field, in that order. When none is
    /// present the canonical reason phrase of the status is used.
    pub fn from_response(status: StatusCode, url: impl Into<String>, body: String) -> Self {
        let message = extract_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_str().to_string())
        });

        Self {
            status_code: status.as_u16(),
            message,
            url: url.into(),
            payload: if body.is_empty() { None } else { Some(body) },
        }
    }

    /// The payload parsed as JSON, if it is JSON
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        self.payload
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }

    /// Whether the status is 401 or 403
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status_code, 401 | 403)
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    let from_error = match value.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    };

    from_error
        .or_else(|| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| value.get("detail").and_then(|m| m.as_str()).map(str::to_string))
        .filter(|m| !m.is_empty())
}

/// Result type alias for Apertus operations
pub type Result<T> = std::result::Result<T, ApertusError>;
