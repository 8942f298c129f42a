use std::time::Duration;
use thiserror::Error;

/// Failure reasons surfaced by token acquisition.
///
/// Every flow returns one of these instead of a sentinel value, so callers
/// can match on the reason.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The redirect carried a `state` different from the attempt's nonce.
    #[error("Authorization state mismatch; callback rejected")]
    StateMismatch {
        expected: String,
        actual: Option<String>,
    },

    /// The provider redirected with an `error` parameter (e.g. `access_denied`).
    #[error("Authorization server returned error: {error}")]
    CallbackError { error: String },

    #[error("Callback carried neither an authorization code nor an error")]
    MissingAuthorizationCode,

    #[error("Cannot listen for the redirect on {address}: {reason}")]
    ListenerBindFailure { address: String, reason: String },

    #[error("No redirect received within {waited:?}")]
    CallbackTimeout { waited: Duration },

    #[error("Token exchange failed{}: {message}", fmt_status(.status))]
    ExchangeFailure { status: Option<u16>, message: String },

    #[error("Token refresh failed{}: {message}", fmt_status(.status))]
    RefreshFailure { status: Option<u16>, message: String },

    /// An authenticated resource request failed after retries.
    #[error("Request failed{}: {message}", fmt_status(.status))]
    RequestFailed { status: Option<u16>, message: String },

    #[error("Authentication cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid token endpoint response: {0}")]
    InvalidResponse(String),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunchFailed(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl AuthError {
    /// Whether calling `authenticate` again may succeed without user or
    /// configuration changes.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AuthError::ExchangeFailure { status, .. }
            | AuthError::RefreshFailure { status, .. }
            | AuthError::RequestFailed { status, .. } => {
                status.map_or(true, crate::retry::is_retryable_status)
            }
            AuthError::CallbackTimeout { .. }
            | AuthError::ListenerBindFailure { .. }
            | AuthError::Cancelled => true,
            AuthError::StateMismatch { .. }
            | AuthError::CallbackError { .. }
            | AuthError::MissingAuthorizationCode
            | AuthError::Configuration(_)
            | AuthError::InvalidResponse(_)
            | AuthError::BrowserLaunchFailed(_) => false,
        }
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status() {
        let err = AuthError::ExchangeFailure {
            status: Some(400),
            message: "invalid_grant".into(),
        };
        assert_eq!(err.to_string(), "Token exchange failed (HTTP 400): invalid_grant");

        let err = AuthError::RefreshFailure {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Token refresh failed: connection reset");
    }

    #[test]
    fn test_state_mismatch_display_hides_nonce() {
        let err = AuthError::StateMismatch {
            expected: "nonce-value".into(),
            actual: Some("other".into()),
        };
        assert!(!err.to_string().contains("nonce-value"));
    }

    #[test]
    fn test_recoverability() {
        assert!(AuthError::ExchangeFailure { status: Some(503), message: String::new() }.is_recoverable());
        assert!(!AuthError::ExchangeFailure { status: Some(401), message: String::new() }.is_recoverable());
        assert!(AuthError::CallbackTimeout { waited: Duration::from_secs(1) }.is_recoverable());
        assert!(!AuthError::CallbackError { error: "access_denied".into() }.is_recoverable());
        assert!(!AuthError::MissingAuthorizationCode.is_recoverable());
    }
}
