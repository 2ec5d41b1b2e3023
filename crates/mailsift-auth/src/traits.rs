//! Trait seams for the remote boundaries.
//!
//! Methods return boxed futures so the traits stay object-safe behind
//! `Arc<dyn ...>` and can be faked in tests.

use crate::outcome::{ApiResult, RefreshExchange};
use crate::AuthResult;
use futures_util::future::BoxFuture;
use mailsift_storage::{CapturedContact, Credential, UserIdentity};
use serde::{Deserialize, Serialize};

/// Identity provider operations (token issuance and account lifecycle).
pub trait IdentityProvider: Send + Sync {
    /// Exchange a refresh token for a new credential.
    fn exchange_refresh_token(&self, refresh_token: String) -> BoxFuture<'static, RefreshExchange>;

    /// Password sign-in.
    fn sign_in(&self, email: String, password: String)
        -> BoxFuture<'static, AuthResult<Credential>>;

    /// Account creation. A credential is included when the provider
    /// auto-confirms the account.
    fn sign_up(
        &self,
        email: String,
        password: String,
    ) -> BoxFuture<'static, AuthResult<SignUpOutcome>>;

    /// Best-effort server-side sign-out. Local state is cleared regardless.
    fn sign_out(&self, access_token: String) -> BoxFuture<'static, ()>;

    /// Server-side probe of the identity behind an access token.
    fn fetch_user(&self, access_token: String) -> BoxFuture<'static, AuthResult<UserIdentity>>;
}

/// Result of a sign-up call.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: UserIdentity,
    pub credential: Option<Credential>,
}

/// Entitlement (subscription) checks.
pub trait EntitlementBackend: Send + Sync {
    fn check_subscription(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<SubscriptionStatus>>;
}

/// Subscription state as reported by the entitlement endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
    #[serde(default)]
    pub subscription: Option<SubscriptionDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    pub plan: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Remote contact storage.
pub trait ContactBackend: Send + Sync {
    /// Bulk upsert, keyed (address, owner) server-side so repeated syncs
    /// update rather than duplicate.
    fn store_contacts(
        &self,
        contacts: Vec<CapturedContact>,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<StoreReceipt>>;

    /// Page through the caller's remote contacts.
    fn fetch_contacts(
        &self,
        limit: u32,
        offset: u32,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<ContactPage>>;
}

/// Server acknowledgement of a bulk upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReceipt {
    pub count: usize,
}

/// One page of remote contacts.
#[derive(Debug, Clone)]
pub struct ContactPage {
    pub contacts: Vec<CapturedContact>,
    pub total: usize,
}
