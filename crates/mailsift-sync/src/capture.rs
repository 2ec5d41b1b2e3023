//! Entitlement-gated capture front door.

use crate::engine::SyncEngine;
use chrono::{DateTime, Utc};
use mailsift_auth::EntitlementCache;
use mailsift_storage::{CaptureStore, CredentialStore, StorageResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extraction heuristics live with the caller (the page scraper); the
/// service only needs the resulting address set.
pub trait EmailExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

/// What a capture call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReceipt {
    /// Whether the caller was entitled to capture at all.
    pub authorized: bool,
    /// Addresses submitted in this call.
    pub captured: usize,
    /// Contacts stored after the merge.
    pub total_stored: usize,
    /// Contacts that did not exist before this call.
    pub newly_added: usize,
}

impl CaptureReceipt {
    fn suppressed() -> Self {
        Self {
            authorized: false,
            captured: 0,
            total_stored: 0,
            newly_added: 0,
        }
    }
}

/// Records sightings behind the entitlement gate and kicks off an automatic
/// sync when a capture adds new contacts.
pub struct CaptureService {
    entitlement: Arc<EntitlementCache>,
    captures: Arc<CaptureStore>,
    credentials: Arc<CredentialStore>,
    sync: Arc<SyncEngine>,
    extractor: Arc<dyn EmailExtractor>,
}

impl CaptureService {
    pub fn new(
        entitlement: Arc<EntitlementCache>,
        captures: Arc<CaptureStore>,
        credentials: Arc<CredentialStore>,
        sync: Arc<SyncEngine>,
        extractor: Arc<dyn EmailExtractor>,
    ) -> Self {
        Self {
            entitlement,
            captures,
            credentials,
            sync,
            extractor,
        }
    }

    /// Record already-extracted addresses sighted on `source_url`.
    ///
    /// Capture is fully suppressed when the entitlement check says no; the
    /// receipt carries `authorized: false` and nothing is stored.
    pub async fn record_from_page<S: AsRef<str>>(
        &self,
        addresses: &[S],
        source_url: &str,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<CaptureReceipt> {
        if !self.entitlement.check_authorized(false).await {
            debug!(url = %source_url, "capture suppressed, not entitled");
            return Ok(CaptureReceipt::suppressed());
        }

        let report = self
            .captures
            .record_sightings(addresses, source_url, observed_at)?;

        if report.newly_added > 0 && self.credentials.auto_sync_enabled().unwrap_or(true) {
            self.spawn_auto_sync(report.newly_added);
        }

        Ok(CaptureReceipt {
            authorized: true,
            captured: addresses.len(),
            total_stored: report.total_stored,
            newly_added: report.newly_added,
        })
    }

    /// Extract addresses from raw page text, then record them.
    pub async fn record_from_text(
        &self,
        text: &str,
        source_url: &str,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<CaptureReceipt> {
        let addresses = self.extractor.extract(text);
        self.record_from_page(&addresses, source_url, observed_at)
            .await
    }

    /// Fire a detached sync. Failures are logged and never surface to the
    /// capture that triggered them.
    fn spawn_auto_sync(&self, newly_added: usize) {
        let engine = self.sync.clone();
        debug!(newly_added, "capture added new contacts, scheduling auto-sync");
        tokio::spawn(async move {
            let report = engine.sync_now().await;
            if report.success {
                debug!(count = ?report.count, "auto-sync completed");
            } else {
                warn!(reason = ?report.reason, message = ?report.message, "auto-sync failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures_util::future::BoxFuture;
    use mailsift_auth::{
        ApiFailure, ApiResult, AuthResult, ContactBackend, ContactPage, CredentialRefresher,
        EntitlementBackend, IdentityProvider, RefreshExchange, StoreReceipt, SubscriptionStatus,
        SystemClock,
    };
    use mailsift_storage::{CapturedContact, Credential, MemoryStorage, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SplitExtractor;

    impl EmailExtractor for SplitExtractor {
        fn extract(&self, text: &str) -> Vec<String> {
            text.split_whitespace()
                .filter(|token| token.contains('@'))
                .map(|token| token.to_string())
                .collect()
        }
    }

    struct FixedEntitlement {
        premium: bool,
    }

    impl EntitlementBackend for FixedEntitlement {
        fn check_subscription(
            &self,
            _access_token: String,
        ) -> BoxFuture<'static, ApiResult<SubscriptionStatus>> {
            let is_premium = self.premium;
            Box::pin(async move {
                Ok(SubscriptionStatus {
                    is_premium,
                    subscription: None,
                })
            })
        }
    }

    struct CountingContacts {
        store_calls: AtomicUsize,
    }

    impl ContactBackend for CountingContacts {
        fn store_contacts(
            &self,
            contacts: Vec<CapturedContact>,
            _access_token: String,
        ) -> BoxFuture<'static, ApiResult<StoreReceipt>> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(StoreReceipt {
                    count: contacts.len(),
                })
            })
        }

        fn fetch_contacts(
            &self,
            _limit: u32,
            _offset: u32,
            _access_token: String,
        ) -> BoxFuture<'static, ApiResult<ContactPage>> {
            Box::pin(async {
                Err(ApiFailure::Transport("not scripted".to_string()))
            })
        }
    }

    struct InertProvider;

    impl IdentityProvider for InertProvider {
        fn exchange_refresh_token(
            &self,
            _refresh_token: String,
        ) -> BoxFuture<'static, RefreshExchange> {
            Box::pin(async { RefreshExchange::Transient("not scripted".to_string()) })
        }

        fn sign_in(
            &self,
            _email: String,
            _password: String,
        ) -> BoxFuture<'static, AuthResult<Credential>> {
            Box::pin(async { Err(mailsift_auth::AuthError::NotSignedIn) })
        }

        fn sign_up(
            &self,
            _email: String,
            _password: String,
        ) -> BoxFuture<'static, AuthResult<mailsift_auth::SignUpOutcome>> {
            Box::pin(async { Err(mailsift_auth::AuthError::NotSignedIn) })
        }

        fn sign_out(&self, _access_token: String) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }

        fn fetch_user(
            &self,
            _access_token: String,
        ) -> BoxFuture<'static, AuthResult<UserIdentity>> {
            Box::pin(async { Err(mailsift_auth::AuthError::NotSignedIn) })
        }
    }

    struct Fixture {
        service: CaptureService,
        captures: Arc<CaptureStore>,
        credentials: Arc<CredentialStore>,
        backend: Arc<CountingContacts>,
    }

    fn fixture(premium: bool) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let credentials = Arc::new(CredentialStore::new(storage.clone()));
        let captures = Arc::new(CaptureStore::new(storage));

        credentials
            .set_credential(&Credential {
                access_token: "access".to_string(),
                refresh_token: Some("r".to_string()),
                expires_at: i64::MAX,
                user: UserIdentity {
                    id: "user-1".to_string(),
                    email: None,
                },
            })
            .unwrap();

        let refresher = Arc::new(CredentialRefresher::new(
            credentials.clone(),
            Arc::new(InertProvider),
            Arc::new(SystemClock),
            60,
        ));
        let entitlement = Arc::new(EntitlementCache::new(
            refresher.clone(),
            Arc::new(FixedEntitlement { premium }),
            credentials.clone(),
            Arc::new(SystemClock),
        ));
        let backend = Arc::new(CountingContacts {
            store_calls: AtomicUsize::new(0),
        });
        let sync = Arc::new(SyncEngine::new(
            captures.clone(),
            credentials.clone(),
            refresher,
            backend.clone(),
        ));
        let service = CaptureService::new(
            entitlement,
            captures.clone(),
            credentials.clone(),
            sync,
            Arc::new(SplitExtractor),
        );

        Fixture {
            service,
            captures,
            credentials,
            backend,
        }
    }

    fn observed() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn unentitled_capture_is_suppressed() {
        let fx = fixture(false);

        let receipt = fx
            .service
            .record_from_page(&["alice@example.com"], "https://page", observed())
            .await
            .unwrap();

        assert!(!receipt.authorized);
        assert_eq!(receipt.newly_added, 0);
        assert_eq!(fx.captures.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn entitled_capture_records_and_auto_syncs() {
        let fx = fixture(true);

        let receipt = fx
            .service
            .record_from_page(
                &["alice@example.com", "bob@example.com"],
                "https://page",
                observed(),
            )
            .await
            .unwrap();

        assert!(receipt.authorized);
        assert_eq!(receipt.captured, 2);
        assert_eq!(receipt.newly_added, 2);
        assert_eq!(fx.captures.count().unwrap(), 2);

        // Let the detached sync run
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.backend.store_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeat_capture_adds_nothing_and_skips_auto_sync() {
        let fx = fixture(true);

        fx.service
            .record_from_page(&["alice@example.com"], "https://page", observed())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let synced_before = fx.backend.store_calls.load(Ordering::SeqCst);

        let receipt = fx
            .service
            .record_from_page(&["alice@example.com"], "https://other", observed())
            .await
            .unwrap();
        assert_eq!(receipt.newly_added, 0);
        assert_eq!(receipt.total_stored, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.backend.store_calls.load(Ordering::SeqCst), synced_before);
    }

    #[tokio::test]
    async fn auto_sync_respects_disabled_flag() {
        let fx = fixture(true);
        fx.credentials.set_auto_sync(false).unwrap();

        fx.service
            .record_from_page(&["alice@example.com"], "https://page", observed())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.backend.store_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn text_capture_extracts_addresses() {
        let fx = fixture(true);

        let receipt = fx
            .service
            .record_from_text(
                "contact alice@example.com or support via bob@example.com thanks",
                "https://page",
                observed(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.captured, 2);
        assert_eq!(receipt.newly_added, 2);
    }
}
