//! Dashboard-side remote API client.

use crate::{BridgeError, BridgeResult};
use futures_util::future::BoxFuture;
use mailsift_auth::{
    ApiFailure, ApiResult, ContactBackend, ContactPage, CredentialRefresher, EntitlementBackend,
    FunctionsClient, RefreshOutcome, SubscriptionStatus,
};
use mailsift_storage::CredentialStore;
use std::sync::Arc;
use tracing::warn;

/// The remote calls the dashboard needs, each wrapped in the
/// refresh-and-retry-once discipline over the bridge's replica.
pub struct DashboardClient {
    refresher: Arc<CredentialRefresher>,
    functions: Arc<FunctionsClient>,
    store: Arc<CredentialStore>,
}

impl DashboardClient {
    pub fn new(
        refresher: Arc<CredentialRefresher>,
        functions: Arc<FunctionsClient>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            refresher,
            functions,
            store,
        }
    }

    pub async fn subscription(&self) -> BridgeResult<SubscriptionStatus> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            functions.check_subscription(token)
        })
        .await
    }

    pub async fn contacts(&self, limit: u32, offset: u32) -> BridgeResult<ContactPage> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            functions.fetch_contacts(limit, offset, token)
        })
        .await
    }

    /// Start a checkout flow; returns the URL to open.
    pub async fn checkout_url(&self) -> BridgeResult<String> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            let functions = (*functions).clone();
            Box::pin(async move { functions.create_checkout(token).await })
        })
        .await
    }

    /// Open the billing portal; returns the URL to open.
    pub async fn portal_url(&self, return_url: String) -> BridgeResult<String> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            let functions = (*functions).clone();
            let return_url = return_url.clone();
            Box::pin(async move { functions.create_portal_session(token, return_url).await })
        })
        .await
    }

    pub async fn cancel_subscription(&self) -> BridgeResult<()> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            let functions = (*functions).clone();
            Box::pin(async move { functions.cancel_subscription(token).await })
        })
        .await
    }

    pub async fn resume_subscription(&self) -> BridgeResult<()> {
        let token = self.bearer().await?;
        let functions = self.functions.clone();
        run_with_retry(&self.refresher, &self.store, token, move |token| {
            let functions = (*functions).clone();
            Box::pin(async move { functions.resume_subscription(token).await })
        })
        .await
    }

    async fn bearer(&self) -> BridgeResult<String> {
        match self.refresher.ensure_fresh().await? {
            Some(credential) => Ok(credential.access_token),
            None => Err(BridgeError::NotSignedIn),
        }
    }
}

/// Run a remote call; on 401, force one refresh and retry once. A 401 that
/// survives the retry expires the replica.
async fn run_with_retry<T, F>(
    refresher: &CredentialRefresher,
    store: &CredentialStore,
    token: String,
    call: F,
) -> BridgeResult<T>
where
    F: Fn(String) -> BoxFuture<'static, ApiResult<T>>,
{
    match call(token).await {
        Ok(value) => Ok(value),
        Err(ApiFailure::Unauthorized) => match refresher.force_refresh().await {
            RefreshOutcome::Refreshed(fresh) => match call(fresh.access_token).await {
                Ok(value) => Ok(value),
                Err(ApiFailure::Unauthorized) => {
                    expire_replica(store);
                    Err(BridgeError::SessionExpired)
                }
                Err(e) => Err(BridgeError::Remote(e.to_string())),
            },
            // The refresher already cleared the replica on rejection
            RefreshOutcome::Rejected => Err(BridgeError::SessionExpired),
            RefreshOutcome::Failed(message) => Err(BridgeError::Remote(message)),
        },
        Err(e) => Err(BridgeError::Remote(e.to_string())),
    }
}

fn expire_replica(store: &CredentialStore) {
    warn!("session no longer accepted, clearing bridge replica");
    if let Err(e) = store.clear_credential() {
        warn!(error = %e, "failed to clear bridge credential");
    }
    if let Err(e) = store.clear_authorization() {
        warn!(error = %e, "failed to clear bridge authorization");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailsift_auth::{
        AuthResult, IdentityProvider, RefreshExchange, RefreshGrant, SignUpOutcome, SystemClock,
    };
    use mailsift_storage::{Credential, MemoryStorage, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};

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
            Box::pin(async { Err(mailsift_auth::AuthError::NotSignedIn) })
        }

        fn sign_up(
            &self,
            _email: String,
            _password: String,
        ) -> BoxFuture<'static, AuthResult<SignUpOutcome>> {
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

    fn fixture() -> (Arc<CredentialRefresher>, Arc<CredentialStore>) {
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
        let refresher = Arc::new(CredentialRefresher::new(
            store.clone(),
            Arc::new(GrantingProvider),
            Arc::new(SystemClock),
            60,
        ));
        (refresher, store)
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let (refresher, store) = fixture();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = {
            let calls = calls.clone();
            run_with_retry(&refresher, &store, "t".to_string(), move |_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(42usize) })
            })
            .await
        };

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_retries_once_with_fresh_token() {
        let (refresher, store) = fixture();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = {
            let calls = calls.clone();
            run_with_retry(&refresher, &store, "stale".to_string(), move |token| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        Err(ApiFailure::Unauthorized)
                    } else {
                        assert_eq!(token, "fresh-access");
                        Ok("ok")
                    }
                })
            })
            .await
        };

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_expires_the_replica() {
        let (refresher, store) = fixture();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: BridgeResult<()> = {
            let calls = calls.clone();
            run_with_retry(&refresher, &store, "stale".to_string(), move |_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(ApiFailure::Unauthorized) })
            })
            .await
        };

        assert!(matches!(result, Err(BridgeError::SessionExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.credential().unwrap().is_none());
    }

    #[tokio::test]
    async fn other_failures_do_not_touch_the_replica() {
        let (refresher, store) = fixture();

        let result: BridgeResult<()> =
            run_with_retry(&refresher, &store, "t".to_string(), move |_token| {
                Box::pin(async {
                    Err(ApiFailure::Status {
                        status: 503,
                        message: "unavailable".to_string(),
                    })
                })
            })
            .await;

        assert!(matches!(result, Err(BridgeError::Remote(_))));
        assert!(store.credential().unwrap().is_some());
    }
}
