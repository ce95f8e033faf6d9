//! Error types
//!
//! Two disjoint families: [`TransportError`] for anything that goes wrong talking to
//! the Bot API (always absorbed by the safe messenger), and [`UsageError`] for misuse
//! of the session API (always returned to the caller).

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the messaging endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Classify a reqwest error, separating timeouts from other network failures
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Network(err)
        }
    }

    /// Check if the endpoint rejected the request with an API-level error
    pub fn is_api_error(&self) -> bool {
        matches!(self, TransportError::Api { .. })
    }

    /// Check if the failure is likely transient (worth trying again on the next flush)
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Timeout(_) => true,
            TransportError::Api { status, .. } => *status == 429 || *status >= 500,
            TransportError::InvalidResponse(_) => false,
            TransportError::Json(_) => false,
        }
    }
}

/// Programmer errors in the use of a reporting session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("`{operation}` must be called while the session is active (inside its scope)")]
    NotActive { operation: &'static str },

    #[error("session {title:?} is already reporting a loop, finish it before starting another")]
    AlreadyActive { title: String },

    #[error("session {title:?} has already finished and cannot be re-entered")]
    Terminated { title: String },

    #[error("a subloop can only be reported from inside an active loop session")]
    IllegalNesting,
}
