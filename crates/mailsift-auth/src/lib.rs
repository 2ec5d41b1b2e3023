//! Session and entitlement engine.
//!
//! This crate owns the credential lifecycle: the identity-provider client,
//! the single-flight refresh coordinator, the TTL'd entitlement cache, and
//! the edge-functions client the sync layer and dashboard talk through.

mod clock;
mod entitlement;
mod error;
mod functions;
mod identity;
mod outcome;
mod refresh;
mod traits;

pub use clock::{Clock, SystemClock};
pub use entitlement::{EntitlementCache, ENTITLEMENT_TTL_SECS};
pub use error::{AuthError, AuthResult};
pub use functions::FunctionsClient;
pub use identity::SupabaseIdentity;
pub use outcome::{ApiFailure, ApiResult, RefreshExchange, RefreshGrant, RefreshOutcome};
pub use refresh::{CredentialRefresher, BRIDGE_EXPIRY_BUFFER_SECS, DAEMON_EXPIRY_BUFFER_SECS};
pub use traits::{
    ContactBackend, ContactPage, EntitlementBackend, IdentityProvider, SignUpOutcome,
    StoreReceipt, SubscriptionDetails, SubscriptionStatus,
};
