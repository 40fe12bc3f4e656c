//! Client-side error type and helpers for the backend's error envelope.

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the REST backend.
///
/// `detail` is either a plain message or a list of validation errors, each
/// carrying a `msg`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Validation(Vec<ValidationItem>),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct ValidationItem {
    msg: String,
}

/// Attempt to parse an error body into a user-facing message.
/// Validation lists are joined with `"; "`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    let message = match parsed.detail {
        ErrorDetail::Message(msg) => msg,
        ErrorDetail::Validation(items) => items
            .into_iter()
            .map(|item| item.msg)
            .collect::<Vec<_>>()
            .join("; "),
    };
    if message.trim().is_empty() {
        None
    } else {
        Some(message)
    }
}

/// API error type for client-side use.
///
/// `Clone` so that a single refresh outcome can be handed to every request
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    /// The refresh token was missing or rejected; the session is over and the
    /// user has to log in again.
    #[error("Session expired")]
    SessionExpired,
    /// An operation needed an access token and none is stored.
    #[error("Not authenticated")]
    Unauthenticated,
}

impl ApiError {
    /// HTTP status code, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is an authorization failure (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Best human-readable message for this error.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Http { body, .. } => {
                try_error_detail(body).unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }
}
