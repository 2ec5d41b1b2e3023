//! Result shapes the sync engine reports upward.

use serde::{Deserialize, Serialize};

/// Why a sync did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorReason {
    /// No usable credential; nothing was sent.
    NotAuthenticated,
    /// The server rejected the token even after a forced refresh.
    AuthFailed,
    /// The server errored or was unreachable.
    ServerError,
}

/// Outcome of a push sync. Infallible by construction: every failure mode
/// collapses into `success: false` plus a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    /// Server-acknowledged contact count, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SyncErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncReport {
    pub fn synced(count: usize) -> Self {
        Self {
            success: true,
            count: Some(count),
            reason: None,
            message: None,
        }
    }

    pub fn failure(reason: SyncErrorReason, message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: None,
            reason: Some(reason),
            message: Some(message.into()),
        }
    }
}

/// Outcome of a pull-and-merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullReport {
    pub success: bool,
    /// Contacts returned by the server in this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched: Option<usize>,
    /// Contacts that did not exist locally before the merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newly_added: Option<usize>,
    /// Server-side total across all pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SyncErrorReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PullReport {
    pub fn merged(fetched: usize, newly_added: usize, total: usize) -> Self {
        Self {
            success: true,
            fetched: Some(fetched),
            newly_added: Some(newly_added),
            total: Some(total),
            reason: None,
            message: None,
        }
    }

    pub fn failure(reason: SyncErrorReason, message: impl Into<String>) -> Self {
        Self {
            success: false,
            fetched: None,
            newly_added: None,
            total: None,
            reason: Some(reason),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reasons_serialize_snake_case() {
        let report = SyncReport::failure(SyncErrorReason::NotAuthenticated, "no session");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["reason"], "not_authenticated");
        assert_eq!(json["success"], false);
        assert!(json.get("count").is_none());
    }

    #[test]
    fn success_omits_failure_fields() {
        let json = serde_json::to_value(SyncReport::synced(7)).unwrap();
        assert_eq!(json["count"], 7);
        assert!(json.get("reason").is_none());
        assert!(json.get("message").is_none());
    }
}
