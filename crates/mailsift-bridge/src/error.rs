//! Bridge error types.

use mailsift_auth::AuthError;
use mailsift_storage::StorageError;
use thiserror::Error;

/// Error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No credential in the replica
    #[error("Not signed in")]
    NotSignedIn,

    /// The server stopped accepting the session even after a refresh
    #[error("Session expired")]
    SessionExpired,

    /// The handoff parameter could not be decoded
    #[error("Malformed session handoff: {0}")]
    Handoff(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Auth engine error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// URL error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Remote call failed
    #[error("Remote call failed: {0}")]
    Remote(String),
}

/// Result type alias using BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;
