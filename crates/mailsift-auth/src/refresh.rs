//! Single-flight token refresh coordinator.
//!
//! At most one refresh exchange is outstanding per instance; concurrent
//! callers await and share its outcome, so a refresh token is never
//! consumed twice concurrently.

use crate::clock::Clock;
use crate::outcome::{RefreshExchange, RefreshOutcome};
use crate::traits::IdentityProvider;
use crate::AuthResult;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use mailsift_storage::{Credential, CredentialStore};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Staleness buffer for the daemon's own refresher.
pub const DAEMON_EXPIRY_BUFFER_SECS: i64 = 30 * 60;

/// Staleness buffer for the dashboard bridge's refresher.
pub const BRIDGE_EXPIRY_BUFFER_SECS: i64 = 60;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Coordinates credential freshness over a [`CredentialStore`].
pub struct CredentialRefresher {
    store: Arc<CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    expiry_buffer_secs: i64,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl CredentialRefresher {
    pub fn new(
        store: Arc<CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        expiry_buffer_secs: i64,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            expiry_buffer_secs,
            in_flight: Mutex::new(None),
        }
    }

    /// Whether a credential is within the staleness window of this instance.
    pub fn is_stale(&self, credential: &Credential) -> bool {
        credential.is_stale(self.clock.now_epoch_secs(), self.expiry_buffer_secs)
    }

    /// Return a credential fit for an outgoing call, refreshing first when
    /// stale and renewable.
    ///
    /// - no stored/usable credential: `Ok(None)`
    /// - fresh: returned unchanged
    /// - stale without a refresh token: returned as-is (the server will say
    ///   401 if it truly no longer accepts it)
    /// - stale with a refresh token: the shared refresh exchange runs; a
    ///   definitive rejection clears stored state, a transient failure
    ///   leaves it untouched, and both yield `Ok(None)`
    pub async fn ensure_fresh(&self) -> AuthResult<Option<Credential>> {
        let Some(credential) = self.store.credential()? else {
            return Ok(None);
        };
        if !credential.is_usable() {
            debug!("stored credential is not usable");
            return Ok(None);
        }
        if !self.is_stale(&credential) {
            return Ok(Some(credential));
        }
        if credential.refresh_token.is_none() {
            debug!("credential is stale but not renewable, returning as-is");
            return Ok(Some(credential));
        }

        match self.run_shared_refresh().await {
            RefreshOutcome::Refreshed(fresh) => Ok(Some(fresh)),
            RefreshOutcome::Rejected => Ok(None),
            RefreshOutcome::Failed(reason) => {
                debug!(reason = %reason, "refresh failed transiently, keeping stored credential");
                Ok(None)
            }
        }
    }

    /// Run the refresh exchange unconditionally. Joins any exchange already
    /// in flight instead of starting a second one.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        self.run_shared_refresh().await
    }

    async fn run_shared_refresh(&self) -> RefreshOutcome {
        let shared = {
            let mut guard = self.in_flight.lock().unwrap();
            match guard.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut: SharedRefresh =
                        Self::refresh_exchange(self.store.clone(), self.provider.clone())
                            .boxed()
                            .shared();
                    *guard = Some(fut.clone());
                    fut
                }
            }
        };

        let outcome = shared.clone().await;

        // Clear the slot only if it still holds the exchange we awaited, so
        // a newer in-flight exchange is never clobbered.
        let mut guard = self.in_flight.lock().unwrap();
        if guard
            .as_ref()
            .map(|current| current.ptr_eq(&shared))
            .unwrap_or(false)
        {
            *guard = None;
        }

        outcome
    }

    async fn refresh_exchange(
        store: Arc<CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> RefreshOutcome {
        let current = match store.credential() {
            Ok(Some(c)) => c,
            Ok(None) => return RefreshOutcome::Failed("no stored credential".to_string()),
            Err(e) => return RefreshOutcome::Failed(e.to_string()),
        };
        let Some(refresh_token) = current.refresh_token.clone() else {
            return RefreshOutcome::Failed("credential is not renewable".to_string());
        };

        match provider.exchange_refresh_token(refresh_token).await {
            RefreshExchange::Granted(grant) => {
                let fresh = Credential {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                    expires_at: grant.expires_at,
                    // Refresh payloads may omit the user; keep the stored one
                    user: grant.user.unwrap_or(current.user),
                };
                if let Err(e) = store.set_credential(&fresh) {
                    warn!(error = %e, "failed to persist refreshed credential");
                    return RefreshOutcome::Failed(e.to_string());
                }
                info!(user_id = %fresh.user.id, "credential refreshed");
                RefreshOutcome::Refreshed(fresh)
            }
            RefreshExchange::Denied(message) => {
                warn!(message = %message, "refresh token rejected, clearing session state");
                if let Err(e) = store.clear_credential() {
                    warn!(error = %e, "failed to clear rejected credential");
                }
                if let Err(e) = store.clear_authorization() {
                    warn!(error = %e, "failed to clear cached authorization");
                }
                RefreshOutcome::Rejected
            }
            RefreshExchange::Transient(message) => RefreshOutcome::Failed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::RefreshGrant;
    use crate::traits::SignUpOutcome;
    use chrono::{DateTime, TimeZone, Utc};
    use mailsift_storage::{MemoryStorage, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn at(secs: i64) -> Self {
            Self {
                now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Scripted provider: counts exchange calls and optionally delays so
    /// concurrent callers overlap.
    struct FakeProvider {
        exchanges: AtomicUsize,
        response: Mutex<Box<dyn Fn() -> RefreshExchange + Send>>,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        fn granting(expires_at: i64) -> Self {
            Self::with_response(move || {
                RefreshExchange::Granted(RefreshGrant {
                    access_token: "fresh-access".to_string(),
                    refresh_token: Some("fresh-refresh".to_string()),
                    expires_at,
                    user: None,
                })
            })
        }

        fn denying() -> Self {
            Self::with_response(|| RefreshExchange::Denied("invalid refresh token".to_string()))
        }

        fn failing() -> Self {
            Self::with_response(|| RefreshExchange::Transient("connection refused".to_string()))
        }

        fn with_response(f: impl Fn() -> RefreshExchange + Send + 'static) -> Self {
            Self {
                exchanges: AtomicUsize::new(0),
                response: Mutex::new(Box::new(f)),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn exchange_count(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }
    }

    impl IdentityProvider for FakeProvider {
        fn exchange_refresh_token(
            &self,
            _refresh_token: String,
        ) -> BoxFuture<'static, RefreshExchange> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            let response = (self.response.lock().unwrap())();
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            })
        }

        fn sign_in(
            &self,
            _email: String,
            _password: String,
        ) -> BoxFuture<'static, AuthResult<Credential>> {
            Box::pin(async { Err(crate::AuthError::NotSignedIn) })
        }

        fn sign_up(
            &self,
            _email: String,
            _password: String,
        ) -> BoxFuture<'static, AuthResult<SignUpOutcome>> {
            Box::pin(async { Err(crate::AuthError::NotSignedIn) })
        }

        fn sign_out(&self, _access_token: String) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }

        fn fetch_user(
            &self,
            _access_token: String,
        ) -> BoxFuture<'static, AuthResult<UserIdentity>> {
            Box::pin(async { Err(crate::AuthError::NotSignedIn) })
        }
    }

    fn credential(expires_at: i64, refresh_token: Option<&str>) -> Credential {
        Credential {
            access_token: "stored-access".to_string(),
            refresh_token: refresh_token.map(|s| s.to_string()),
            expires_at,
            user: UserIdentity {
                id: "user-1".to_string(),
                email: Some("user@example.com".to_string()),
            },
        }
    }

    fn refresher(
        provider: Arc<FakeProvider>,
        now_secs: i64,
        buffer_secs: i64,
    ) -> (Arc<CredentialRefresher>, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        let refresher = Arc::new(CredentialRefresher::new(
            store.clone(),
            provider,
            Arc::new(ManualClock::at(now_secs)),
            buffer_secs,
        ));
        (refresher, store)
    }

    #[tokio::test]
    async fn no_credential_yields_none() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, _store) = refresher(provider.clone(), 1_000, 60);

        assert!(refresher.ensure_fresh().await.unwrap().is_none());
        assert_eq!(provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn fresh_credential_is_returned_without_network() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(5_000, Some("r"))).unwrap();

        let got = refresher.ensure_fresh().await.unwrap().unwrap();
        assert_eq!(got.access_token, "stored-access");
        assert_eq!(provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn stale_without_refresh_token_is_returned_as_is() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, None)).unwrap();

        let got = refresher.ensure_fresh().await.unwrap().unwrap();
        assert_eq!(got.access_token, "stored-access");
        assert_eq!(provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn stale_with_refresh_token_is_refreshed_and_persisted() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();

        let got = refresher.ensure_fresh().await.unwrap().unwrap();
        assert_eq!(got.access_token, "fresh-access");
        // User preserved from the stored credential when the grant omits it
        assert_eq!(got.user.id, "user-1");

        let stored = store.credential().unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh-access");
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn buffer_triggers_early_refresh() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, store) = refresher(provider.clone(), 1_000, 1_800);
        // Expires at 2_000, now 1_000, buffer 1_800: stale
        store.set_credential(&credential(2_000, Some("r"))).unwrap();

        refresher.ensure_fresh().await.unwrap();
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn definitive_rejection_clears_credential_and_authorization() {
        let provider = Arc::new(FakeProvider::denying());
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();
        store.set_authorized(true).unwrap();

        assert!(refresher.ensure_fresh().await.unwrap().is_none());
        assert!(store.credential().unwrap().is_none());
        assert!(!store.authorized().unwrap());
    }

    #[tokio::test]
    async fn transient_failure_leaves_storage_untouched() {
        let provider = Arc::new(FakeProvider::failing());
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();
        store.set_authorized(true).unwrap();

        assert!(refresher.ensure_fresh().await.unwrap().is_none());
        // Credential and authorization survive for the next attempt
        let stored = store.credential().unwrap().unwrap();
        assert_eq!(stored.access_token, "stored-access");
        assert!(store.authorized().unwrap());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let provider =
            Arc::new(FakeProvider::granting(10_000).with_delay(Duration::from_millis(50)));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let refresher = refresher.clone();
            handles.push(tokio::spawn(
                async move { refresher.ensure_fresh().await },
            ));
        }

        for handle in handles {
            let got = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(got.access_token, "fresh-access");
        }
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn force_refresh_joins_in_flight_exchange() {
        let provider =
            Arc::new(FakeProvider::granting(10_000).with_delay(Duration::from_millis(50)));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();

        let a = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.force_refresh().await })
        };
        let b = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.force_refresh().await })
        };

        assert!(matches!(
            a.await.unwrap(),
            RefreshOutcome::Refreshed(_)
        ));
        assert!(matches!(
            b.await.unwrap(),
            RefreshOutcome::Refreshed(_)
        ));
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn refresh_slot_clears_after_completion() {
        let provider = Arc::new(FakeProvider::granting(10_000));
        let (refresher, store) = refresher(provider.clone(), 1_000, 60);
        store.set_credential(&credential(900, Some("r"))).unwrap();

        refresher.force_refresh().await;
        refresher.force_refresh().await;
        // Sequential calls each run their own exchange
        assert_eq!(provider.exchange_count(), 2);
    }
}
