//! Errors surfaced by the GitLab client
//!
//! The client never swallows failures: a request either succeeds (possibly
//! after transparent retries) or returns one of these variants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Error body as returned by GitLab
///
/// GitLab uses `{"message": "404 Not found"}`, `{"message": {"field": [..]}}`
/// or OAuth style `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    pub message: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RemoteErrorBody {
    /// Human-readable summary of the body
    pub fn summary(&self) -> String {
        if let Some(message) = &self.message {
            return match message {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

fn describe_body(body: &Option<RemoteErrorBody>) -> String {
    body.as_ref()
        .map(|b| format!(": {}", b.summary()))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status, either non-retryable or after retries ran out
    #[error("GitLab API returned HTTP {status} for {path} after {attempts} attempt(s){}", describe_body(.body))]
    Status {
        status: u16,
        path: String,
        body: Option<RemoteErrorBody>,
        attempts: u32,
    },

    /// Connection-level failure without an HTTP status
    #[error("request to {path} failed after {attempts} attempt(s): {message}")]
    Transport {
        path: String,
        message: String,
        attempts: u32,
    },

    /// The per-request timeout elapsed (never retried)
    #[error("request to {path} timed out")]
    Timeout { path: String },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the failure is of a kind the transport retries
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => crate::retry::is_retryable_status(*status),
            ApiError::Transport { .. } => true,
            ApiError::Timeout { .. } | ApiError::Decode { .. } | ApiError::InvalidRequest(_) => {
                false
            }
        }
    }

    /// Parsed remote error body, if any
    pub fn body(&self) -> Option<&RemoteErrorBody> {
        match self {
            ApiError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}
