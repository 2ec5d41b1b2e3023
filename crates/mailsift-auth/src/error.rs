//! Auth error types.

use mailsift_storage::StorageError;
use thiserror::Error;

/// Error type for auth operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider rejected the supplied credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No usable credential is available
    #[error("Not signed in")]
    NotSignedIn,

    /// The stored credential was rejected by the server
    #[error("Session invalid")]
    SessionInvalid,

    /// Identity provider returned an unexpected response
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl AuthError {
    /// Whether the failure is transient (network, timeout, 5xx) and worth
    /// retrying on the next natural trigger, as opposed to a definitive
    /// rejection.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_errors_are_not_transient() {
        assert!(!AuthError::NotSignedIn.is_transient());
        assert!(!AuthError::SessionInvalid.is_transient());
        assert!(!AuthError::InvalidCredentials("bad password".into()).is_transient());
        assert!(!AuthError::Encoding("bad base64".into()).is_transient());
    }

    #[test]
    fn storage_error_converts() {
        let err: AuthError = StorageError::Backend("disk full".into()).into();
        assert!(matches!(err, AuthError::Storage(_)));
    }
}
