//! Tagged outcomes for the remote boundaries.
//!
//! Callers above the boundary clients never see raw HTTP errors; they see
//! these small discriminated results and apply policy over them.

use mailsift_storage::{Credential, UserIdentity};
use thiserror::Error;

/// Outcome of a refresh attempt, shared by every concurrent caller.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A fresh credential was obtained and persisted.
    Refreshed(Credential),
    /// The provider definitively rejected the refresh token. The stored
    /// credential and cached authorization have been cleared.
    Rejected,
    /// Transient failure. Stored state was left untouched.
    Failed(String),
}

/// What the identity provider said to a refresh-token exchange.
#[derive(Debug)]
pub enum RefreshExchange {
    Granted(RefreshGrant),
    /// HTTP 400/401 from the refresh endpoint.
    Denied(String),
    /// Network failure, timeout, or 5xx.
    Transient(String),
}

/// Payload of a successful refresh-token exchange.
///
/// `user` may be absent; the coordinator preserves the previously stored
/// identity in that case.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub user: Option<UserIdentity>,
}

/// Failure of an authenticated API call (entitlement, contacts, billing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// The server did not accept the bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Non-2xx response other than an auth rejection.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiFailure {
    pub fn is_transient(&self) -> bool {
        match self {
            ApiFailure::Transport(_) => true,
            ApiFailure::Status { status, .. } => *status >= 500,
            ApiFailure::Unauthorized => false,
        }
    }
}

/// Result type for authenticated API calls.
pub type ApiResult<T> = Result<T, ApiFailure>;
