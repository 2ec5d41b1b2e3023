//! Daemon state definition.

use mailsift_auth::{CredentialRefresher, EntitlementCache, SupabaseIdentity};
use mailsift_core::{Config, Paths};
use mailsift_storage::{CaptureStore, CredentialStore};
use mailsift_sync::{CaptureService, SyncEngine};
use std::sync::Arc;

/// Shared daemon state (thread-safe).
#[derive(Clone)]
pub struct DaemonState {
    #[allow(dead_code)]
    pub config: Arc<Config>,
    #[allow(dead_code)]
    pub paths: Arc<Paths>,
    /// Typed access to the stored credential and daemon flags.
    pub credentials: Arc<CredentialStore>,
    /// The local captured-contact collection.
    pub captures: Arc<CaptureStore>,
    /// Identity provider client (sign-in/up/out, token exchange).
    pub identity: Arc<SupabaseIdentity>,
    /// Single-flight token refresh coordinator.
    pub refresher: Arc<CredentialRefresher>,
    /// TTL'd entitlement cache consulted before every capture.
    pub entitlement: Arc<EntitlementCache>,
    /// Push/pull reconciliation against the remote store.
    pub sync: Arc<SyncEngine>,
    /// Entitlement-gated capture front door.
    pub capture_service: Arc<CaptureService>,
}
