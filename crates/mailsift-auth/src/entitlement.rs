//! TTL'd authorization (entitlement) cache.
//!
//! Consulted before every capture. Checks within the TTL are answered from
//! memory; concurrent misses share a single in-flight remote check.

use crate::clock::Clock;
use crate::outcome::{ApiFailure, RefreshOutcome};
use crate::refresh::CredentialRefresher;
use crate::traits::EntitlementBackend;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use mailsift_storage::CredentialStore;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// How long a cached verdict satisfies unforced checks.
pub const ENTITLEMENT_TTL_SECS: i64 = 60;

type SharedCheck = Shared<BoxFuture<'static, bool>>;

#[derive(Debug, Clone, Copy, Default)]
struct CacheState {
    is_authorized: bool,
    last_checked_at: Option<DateTime<Utc>>,
}

enum Verdict {
    Decided(bool),
    /// Backend unreachable or misbehaving; keep the previous verdict.
    Unavailable(String),
}

/// Cached entitlement verdict with single-flight remote checks.
pub struct EntitlementCache {
    refresher: Arc<CredentialRefresher>,
    backend: Arc<dyn EntitlementBackend>,
    store: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
    state: Arc<Mutex<CacheState>>,
    in_flight: Mutex<Option<SharedCheck>>,
}

impl EntitlementCache {
    pub fn new(
        refresher: Arc<CredentialRefresher>,
        backend: Arc<dyn EntitlementBackend>,
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_ttl(refresher, backend, store, clock, ENTITLEMENT_TTL_SECS)
    }

    pub fn with_ttl(
        refresher: Arc<CredentialRefresher>,
        backend: Arc<dyn EntitlementBackend>,
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
        ttl_secs: i64,
    ) -> Self {
        // Seed from the durable flag; last_checked_at stays unset so the
        // first check after start goes remote.
        let seeded = store.authorized().unwrap_or(false);
        Self {
            refresher,
            backend,
            store,
            clock,
            ttl_secs,
            state: Arc::new(Mutex::new(CacheState {
                is_authorized: seeded,
                last_checked_at: None,
            })),
            in_flight: Mutex::new(None),
        }
    }

    /// Current authorization verdict.
    ///
    /// Unforced checks inside the TTL return the cached verdict without a
    /// remote call. On a 401 the check forces exactly one token refresh and
    /// retries once; if the refresh or the retry fails, the verdict settles
    /// on unauthorized. A non-401 failure of the first call keeps the
    /// previous verdict but still advances the check instant, so failures
    /// do not hot-loop.
    pub async fn check_authorized(&self, force: bool) -> bool {
        if !force {
            let state = self.state.lock().unwrap();
            if let Some(last) = state.last_checked_at {
                let age = (self.clock.now() - last).num_seconds();
                if age < self.ttl_secs {
                    return state.is_authorized;
                }
            }
        }

        let shared = {
            let mut guard = self.in_flight.lock().unwrap();
            match guard.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut: SharedCheck = Self::remote_check(
                        self.refresher.clone(),
                        self.backend.clone(),
                        self.store.clone(),
                        self.clock.clone(),
                        self.state.clone(),
                    )
                    .boxed()
                    .shared();
                    *guard = Some(fut.clone());
                    fut
                }
            }
        };

        let verdict = shared.clone().await;

        let mut guard = self.in_flight.lock().unwrap();
        if guard
            .as_ref()
            .map(|current| current.ptr_eq(&shared))
            .unwrap_or(false)
        {
            *guard = None;
        }

        verdict
    }

    /// Drop the in-memory verdict, e.g. after a session change. The next
    /// check goes remote.
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap();
        *state = CacheState::default();
        debug!("entitlement cache invalidated");
    }

    /// Cached verdict and when it was last confirmed, without any remote call.
    pub fn cached(&self) -> (bool, Option<DateTime<Utc>>) {
        let state = self.state.lock().unwrap();
        (state.is_authorized, state.last_checked_at)
    }

    async fn remote_check(
        refresher: Arc<CredentialRefresher>,
        backend: Arc<dyn EntitlementBackend>,
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
        state: Arc<Mutex<CacheState>>,
    ) -> bool {
        let verdict = Self::query_backend(&refresher, &backend).await;
        let now = clock.now();

        match verdict {
            Verdict::Decided(authorized) => {
                {
                    let mut state = state.lock().unwrap();
                    state.is_authorized = authorized;
                    state.last_checked_at = Some(now);
                }
                if let Err(e) = store.set_authorized(authorized) {
                    warn!(error = %e, "failed to persist authorization verdict");
                }
                info!(authorized = authorized, "entitlement check completed");
                authorized
            }
            Verdict::Unavailable(reason) => {
                let mut state = state.lock().unwrap();
                state.last_checked_at = Some(now);
                warn!(reason = %reason, "entitlement check unavailable, keeping previous verdict");
                state.is_authorized
            }
        }
    }

    async fn query_backend(
        refresher: &Arc<CredentialRefresher>,
        backend: &Arc<dyn EntitlementBackend>,
    ) -> Verdict {
        let credential = match refresher.ensure_fresh().await {
            Ok(Some(c)) => c,
            Ok(None) => return Verdict::Decided(false),
            Err(e) => return Verdict::Unavailable(e.to_string()),
        };

        match backend.check_subscription(credential.access_token).await {
            Ok(status) => Verdict::Decided(status.is_premium),
            Err(ApiFailure::Unauthorized) => {
                // One forced refresh, one retry. Once the server has refused
                // the token, a check that cannot be salvaged by a fresh one
                // settles on unauthorized rather than keeping an old verdict.
                match refresher.force_refresh().await {
                    RefreshOutcome::Refreshed(fresh) => {
                        match backend.check_subscription(fresh.access_token).await {
                            Ok(status) => Verdict::Decided(status.is_premium),
                            Err(e) => {
                                debug!(error = %e, "entitlement retry failed");
                                Verdict::Decided(false)
                            }
                        }
                    }
                    RefreshOutcome::Rejected => Verdict::Decided(false),
                    RefreshOutcome::Failed(reason) => {
                        warn!(reason = %reason, "refresh after rejected entitlement check failed");
                        Verdict::Decided(false)
                    }
                }
            }
            Err(e) => Verdict::Unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{RefreshExchange, RefreshGrant};
    use crate::traits::{IdentityProvider, SignUpOutcome, SubscriptionStatus};
    use crate::AuthResult;
    use chrono::TimeZone;
    use mailsift_storage::{Credential, MemoryStorage, UserIdentity};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
            })
        }

        fn advance(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    struct FakeBackend {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Result<bool, ApiFailure>>>,
        delay: Option<std::time::Duration>,
    }

    impl FakeBackend {
        fn scripted(script: Vec<Result<bool, ApiFailure>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                delay: None,
            })
        }

        fn scripted_slow(script: Vec<Result<bool, ApiFailure>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                delay: Some(std::time::Duration::from_millis(50)),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EntitlementBackend for FakeBackend {
        fn check_subscription(
            &self,
            _access_token: String,
        ) -> BoxFuture<'static, crate::ApiResult<SubscriptionStatus>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(false));
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                next.map(|is_premium| SubscriptionStatus {
                    is_premium,
                    subscription: None,
                })
            })
        }
    }

    struct GrantingProvider;

    impl IdentityProvider for GrantingProvider {
        fn exchange_refresh_token(
            &self,
            _refresh_token: String,
        ) -> BoxFuture<'static, RefreshExchange> {
            Box::pin(async {
                RefreshExchange::Granted(RefreshGrant {
                    access_token: "fresh-access".to_string(),
                    refresh_token: Some("fresh-refresh".to_string()),
                    expires_at: i64::MAX,
                    user: None,
                })
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

    fn signed_in_store() -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        store
            .set_credential(&Credential {
                access_token: "stored-access".to_string(),
                refresh_token: Some("r".to_string()),
                expires_at: i64::MAX,
                user: UserIdentity {
                    id: "user-1".to_string(),
                    email: None,
                },
            })
            .unwrap();
        store
    }

    /// Provider whose refresh endpoint is unreachable.
    struct OfflineProvider;

    impl IdentityProvider for OfflineProvider {
        fn exchange_refresh_token(
            &self,
            _refresh_token: String,
        ) -> BoxFuture<'static, RefreshExchange> {
            Box::pin(async { RefreshExchange::Transient("connection refused".to_string()) })
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

    fn cache_with(
        backend: Arc<FakeBackend>,
        store: Arc<CredentialStore>,
        clock: Arc<ManualClock>,
    ) -> EntitlementCache {
        cache_with_provider(backend, store, clock, Arc::new(GrantingProvider))
    }

    fn cache_with_provider(
        backend: Arc<FakeBackend>,
        store: Arc<CredentialStore>,
        clock: Arc<ManualClock>,
        provider: Arc<dyn IdentityProvider>,
    ) -> EntitlementCache {
        let refresher = Arc::new(CredentialRefresher::new(
            store.clone(),
            provider,
            clock.clone(),
            60,
        ));
        EntitlementCache::new(refresher, backend, store, clock)
    }

    #[tokio::test]
    async fn verdict_is_cached_within_ttl() {
        let backend = FakeBackend::scripted(vec![Ok(true)]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock.clone());

        assert!(cache.check_authorized(false).await);
        assert!(cache.check_authorized(false).await);
        assert!(cache.check_authorized(false).await);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn ttl_expiry_goes_remote_again() {
        let backend = FakeBackend::scripted(vec![Ok(true), Ok(false)]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock.clone());

        assert!(cache.check_authorized(false).await);
        clock.advance(ENTITLEMENT_TTL_SECS + 1);
        assert!(!cache.check_authorized(false).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn force_bypasses_ttl() {
        let backend = FakeBackend::scripted(vec![Ok(true), Ok(false)]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock.clone());

        assert!(cache.check_authorized(false).await);
        assert!(!cache.check_authorized(true).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn no_credential_is_unauthorized_and_cached() {
        let backend = FakeBackend::scripted(vec![]);
        let clock = ManualClock::at(1_000);
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        let cache = cache_with(backend.clone(), store.clone(), clock);

        assert!(!cache.check_authorized(false).await);
        // Signed-out verdict needs no backend call and is cached
        assert!(!cache.check_authorized(false).await);
        assert_eq!(backend.call_count(), 0);
        assert!(!store.authorized().unwrap());
    }

    #[tokio::test]
    async fn unauthorized_forces_one_refresh_and_retries_once() {
        let backend = FakeBackend::scripted(vec![Err(ApiFailure::Unauthorized), Ok(true)]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock);

        assert!(cache.check_authorized(true).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_settles_on_false() {
        let backend = FakeBackend::scripted(vec![
            Err(ApiFailure::Unauthorized),
            Err(ApiFailure::Unauthorized),
        ]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock);

        assert!(!cache.check_authorized(true).await);
        // Exactly one retry, never more
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_after_unauthorized_settles_on_false() {
        let backend = FakeBackend::scripted(vec![Ok(true), Err(ApiFailure::Unauthorized)]);
        let clock = ManualClock::at(1_000);
        let store = signed_in_store();
        let cache = cache_with_provider(
            backend.clone(),
            store.clone(),
            clock,
            Arc::new(OfflineProvider),
        );

        assert!(cache.check_authorized(false).await);
        // 401 on the forced check, then the refresh itself fails: the old
        // verdict does not survive the rejected token.
        assert!(!cache.check_authorized(true).await);
        assert_eq!(backend.call_count(), 2);
        assert!(!store.authorized().unwrap());
    }

    #[tokio::test]
    async fn failed_retry_after_refresh_settles_on_false() {
        let backend = FakeBackend::scripted(vec![
            Err(ApiFailure::Unauthorized),
            Err(ApiFailure::Status {
                status: 503,
                message: "unavailable".to_string(),
            }),
        ]);
        let clock = ManualClock::at(1_000);
        let store = signed_in_store();
        let cache = cache_with(backend.clone(), store.clone(), clock);

        assert!(!cache.check_authorized(true).await);
        assert_eq!(backend.call_count(), 2);
        assert!(!store.authorized().unwrap());
    }

    #[tokio::test]
    async fn backend_failure_keeps_previous_verdict_but_advances_check_instant() {
        let backend = FakeBackend::scripted(vec![
            Ok(true),
            Err(ApiFailure::Status {
                status: 503,
                message: "unavailable".to_string(),
            }),
        ]);
        let clock = ManualClock::at(1_000);
        let store = signed_in_store();
        let cache = cache_with(backend.clone(), store.clone(), clock.clone());

        assert!(cache.check_authorized(false).await);
        let (_, first_checked) = cache.cached();

        clock.advance(ENTITLEMENT_TTL_SECS + 1);
        // Failure: verdict preserved, instant advanced
        assert!(cache.check_authorized(false).await);
        let (verdict, second_checked) = cache.cached();
        assert!(verdict);
        assert!(second_checked > first_checked);

        // And the advanced instant satisfies the TTL again
        assert!(cache.check_authorized(false).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn verdict_persists_to_durable_flag() {
        let backend = FakeBackend::scripted(vec![Ok(true)]);
        let clock = ManualClock::at(1_000);
        let store = signed_in_store();
        let cache = cache_with(backend.clone(), store.clone(), clock);

        cache.check_authorized(false).await;
        assert!(store.authorized().unwrap());
    }

    #[tokio::test]
    async fn invalidate_forces_next_check_remote() {
        let backend = FakeBackend::scripted(vec![Ok(true), Ok(true)]);
        let clock = ManualClock::at(1_000);
        let cache = cache_with(backend.clone(), signed_in_store(), clock);

        assert!(cache.check_authorized(false).await);
        cache.invalidate();
        let (verdict, checked) = cache.cached();
        assert!(!verdict);
        assert!(checked.is_none());

        assert!(cache.check_authorized(false).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn seeds_from_durable_flag() {
        let backend = FakeBackend::scripted(vec![]);
        let clock = ManualClock::at(1_000);
        let store = signed_in_store();
        store.set_authorized(true).unwrap();

        let cache = cache_with(backend, store, clock);
        let (verdict, checked) = cache.cached();
        assert!(verdict);
        assert!(checked.is_none());
    }

    #[tokio::test]
    async fn concurrent_checks_share_one_remote_call() {
        let backend = FakeBackend::scripted_slow(vec![Ok(true)]);
        let clock = ManualClock::at(1_000);
        let cache = Arc::new(cache_with(backend.clone(), signed_in_store(), clock));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.check_authorized(true).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(backend.call_count(), 1);
    }
}
