//! Session error types.

use thiserror::Error;

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Credential store could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Sign-in rejected by the server
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Refresh exchange failed; the session has been signed out
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// The server rejected the bearer token and there is no session to refresh
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response from the API
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid state transition in the refresh FSM
    #[error("Invalid refresh state transition: {0}")]
    InvalidStateTransition(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors are connection failures, timeouts, and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Network(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            SessionError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of a server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Server { status, .. } => Some(*status),
            SessionError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<credential_store::StorageError> for SessionError {
    fn from(err: credential_store::StorageError) -> Self {
        SessionError::StorageUnavailable(err.to_string())
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
