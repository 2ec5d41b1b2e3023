//! Push and pull reconciliation against the remote contact store.

use crate::report::{PullReport, SyncErrorReason, SyncReport};
use futures_util::future::BoxFuture;
use mailsift_auth::{ApiFailure, ApiResult, ContactBackend, CredentialRefresher, RefreshOutcome};
use mailsift_storage::{CaptureStore, CredentialStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct SyncFailure {
    reason: SyncErrorReason,
    message: String,
}

impl SyncFailure {
    fn new(reason: SyncErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Reconciles the local capture collection with the remote store.
///
/// Every remote call follows the refresh-and-retry-once discipline: a 401
/// forces exactly one token refresh and one retry, never more. Local data
/// is never cleared on failure.
pub struct SyncEngine {
    captures: Arc<CaptureStore>,
    credentials: Arc<CredentialStore>,
    refresher: Arc<CredentialRefresher>,
    backend: Arc<dyn ContactBackend>,
}

impl SyncEngine {
    pub fn new(
        captures: Arc<CaptureStore>,
        credentials: Arc<CredentialStore>,
        refresher: Arc<CredentialRefresher>,
        backend: Arc<dyn ContactBackend>,
    ) -> Self {
        Self {
            captures,
            credentials,
            refresher,
            backend,
        }
    }

    /// Push the full local snapshot to the remote store.
    ///
    /// The remote upsert is keyed per (address, owner), so repeated syncs
    /// update rather than duplicate. A failure leaves the durable
    /// last-sync-error set until the next success clears it.
    pub async fn sync_now(&self) -> SyncReport {
        let token = match self.bearer().await {
            Ok(token) => token,
            Err(failure) => return self.push_failure(failure),
        };

        let contacts = match self.captures.snapshot() {
            Ok(contacts) => contacts,
            Err(e) => {
                return self.push_failure(SyncFailure::new(
                    SyncErrorReason::ServerError,
                    e.to_string(),
                ))
            }
        };
        if contacts.is_empty() {
            debug!("nothing to sync");
            self.clear_sync_error();
            return SyncReport::synced(0);
        }

        let backend = self.backend.clone();
        let result = self
            .with_retry(token, move |token| {
                backend.store_contacts(contacts.clone(), token)
            })
            .await;

        match result {
            Ok(receipt) => {
                info!(count = receipt.count, "sync completed");
                self.clear_sync_error();
                SyncReport::synced(receipt.count)
            }
            Err(failure) => self.push_failure(failure),
        }
    }

    /// Fetch a page of remote contacts and merge it into the local store.
    pub async fn pull_remote(&self, limit: u32, offset: u32) -> PullReport {
        let token = match self.bearer().await {
            Ok(token) => token,
            Err(failure) => return PullReport::failure(failure.reason, failure.message),
        };

        let backend = self.backend.clone();
        let page = match self
            .with_retry(token, move |token| {
                backend.fetch_contacts(limit, offset, token)
            })
            .await
        {
            Ok(page) => page,
            Err(failure) => return PullReport::failure(failure.reason, failure.message),
        };

        match self.captures.merge_remote(&page.contacts) {
            Ok(newly_added) => {
                info!(
                    fetched = page.contacts.len(),
                    newly_added, "pulled remote contacts"
                );
                PullReport::merged(page.contacts.len(), newly_added, page.total)
            }
            Err(e) => PullReport::failure(SyncErrorReason::ServerError, e.to_string()),
        }
    }

    async fn bearer(&self) -> Result<String, SyncFailure> {
        match self.refresher.ensure_fresh().await {
            Ok(Some(credential)) => Ok(credential.access_token),
            Ok(None) => Err(SyncFailure::new(
                SyncErrorReason::NotAuthenticated,
                "no active session",
            )),
            Err(e) => Err(SyncFailure::new(SyncErrorReason::ServerError, e.to_string())),
        }
    }

    /// Run a remote call; on 401, force one refresh and retry once.
    async fn with_retry<T, F>(&self, token: String, call: F) -> Result<T, SyncFailure>
    where
        F: Fn(String) -> BoxFuture<'static, ApiResult<T>>,
    {
        match call(token).await {
            Ok(value) => Ok(value),
            Err(ApiFailure::Unauthorized) => match self.refresher.force_refresh().await {
                RefreshOutcome::Refreshed(fresh) => match call(fresh.access_token).await {
                    Ok(value) => Ok(value),
                    Err(ApiFailure::Unauthorized) => Err(SyncFailure::new(
                        SyncErrorReason::AuthFailed,
                        "token rejected after refresh",
                    )),
                    Err(e) => Err(SyncFailure::new(SyncErrorReason::ServerError, e.to_string())),
                },
                RefreshOutcome::Rejected => Err(SyncFailure::new(
                    SyncErrorReason::AuthFailed,
                    "session revoked",
                )),
                RefreshOutcome::Failed(message) => {
                    Err(SyncFailure::new(SyncErrorReason::AuthFailed, message))
                }
            },
            Err(e) => Err(SyncFailure::new(SyncErrorReason::ServerError, e.to_string())),
        }
    }

    fn push_failure(&self, failure: SyncFailure) -> SyncReport {
        warn!(reason = ?failure.reason, message = %failure.message, "sync failed");
        if failure.reason == SyncErrorReason::ServerError {
            if let Err(e) = self.credentials.set_last_sync_error(&failure.message) {
                warn!(error = %e, "failed to record sync error");
            }
        }
        SyncReport::failure(failure.reason, failure.message)
    }

    fn clear_sync_error(&self) {
        if let Err(e) = self.credentials.clear_last_sync_error() {
            warn!(error = %e, "failed to clear sync error");
        }
    }
}
