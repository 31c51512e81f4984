//! Error taxonomy for remote calls and session operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error class, used for logging and caller-side handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection refused, timeout, 5xx.
    Transport,
    /// Response could not be decoded.
    Protocol,
    /// Bad credentials or expired token.
    Auth,
    /// Rejected input: blank fields, duplicate registration.
    Validation,
    /// No endpoint bound or no session.
    State,
}

/// Error returned by remote calls and engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rejected: {0}")]
    Validation(String),
    #[error("No remote endpoint configured")]
    Disconnected,
    #[error("Not logged in")]
    NotAuthenticated,
}

impl ChatError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Disconnected | Self::NotAuthenticated => ErrorCategory::State,
        }
    }

    /// Build an error for a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match classify_http_status(status) {
            ErrorCategory::Auth => Self::Auth(reason),
            ErrorCategory::Validation => Self::Validation(reason),
            ErrorCategory::Protocol => Self::Protocol(reason),
            ErrorCategory::Transport | ErrorCategory::State => Self::Transport(reason),
        }
    }
}

/// Map HTTP status codes to error categories.
#[must_use]
pub const fn classify_http_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 429 => ErrorCategory::Transport,
        400..=499 => ErrorCategory::Validation,
        500..=599 => ErrorCategory::Transport,
        _ => ErrorCategory::Protocol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_categories() {
        assert_eq!(classify_http_status(401), ErrorCategory::Auth);
        assert_eq!(classify_http_status(403), ErrorCategory::Auth);
        assert_eq!(classify_http_status(409), ErrorCategory::Validation);
        assert_eq!(classify_http_status(408), ErrorCategory::Transport);
        assert_eq!(classify_http_status(503), ErrorCategory::Transport);
        assert_eq!(classify_http_status(302), ErrorCategory::Protocol);
    }

    #[test]
    fn status_errors_carry_reason() {
        let err = ChatError::from_status(401, "bad password");
        assert_eq!(err, ChatError::Auth("bad password".into()));
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert_eq!(err.to_string(), "Authentication failed: bad password");
    }

    #[test]
    fn state_errors_share_a_category() {
        assert_eq!(ChatError::Disconnected.category(), ErrorCategory::State);
        assert_eq!(ChatError::NotAuthenticated.category(), ErrorCategory::State);
    }
}
