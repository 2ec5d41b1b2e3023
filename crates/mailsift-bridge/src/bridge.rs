//! The web origin's credential replica.

use crate::handoff::{decode_handoff, handoff_param, strip_handoff};
use crate::BridgeResult;
use mailsift_auth::CredentialRefresher;
use mailsift_storage::{Credential, CredentialStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Bridges the daemon's session into an independent web origin.
///
/// The incoming handoff is consumed at most once per bridge instance, even
/// when decoding fails, so a stale URL can never re-authenticate a page
/// the user signed out of.
pub struct SessionBridge {
    store: Arc<CredentialStore>,
    refresher: Arc<CredentialRefresher>,
    url_consumed: AtomicBool,
}

impl SessionBridge {
    pub fn new(store: Arc<CredentialStore>, refresher: Arc<CredentialRefresher>) -> Self {
        Self {
            store,
            refresher,
            url_consumed: AtomicBool::new(false),
        }
    }

    /// Consume a credential handed off in the page URL, if present.
    ///
    /// On success the credential is persisted into this origin's replica
    /// and returned with the cleaned URL the page should display.
    pub fn read_incoming_credential(
        &self,
        page_url: &Url,
    ) -> BridgeResult<Option<(Credential, Url)>> {
        let Some(param) = handoff_param(page_url) else {
            return Ok(None);
        };
        if self.url_consumed.swap(true, Ordering::SeqCst) {
            debug!("handoff already consumed by this bridge");
            return Ok(None);
        }

        let credential = match decode_handoff(&param) {
            Ok(credential) => credential,
            Err(e) => {
                // Consumed regardless; a broken handoff is spent, not retried
                warn!(error = %e, "discarding malformed session handoff");
                return Err(e);
            }
        };

        self.store.set_credential(&credential)?;
        info!(user_id = %credential.user.id, "session handoff accepted");
        Ok(Some((credential, strip_handoff(page_url))))
    }

    /// Credential fit for a dashboard call: consume any incoming handoff
    /// first, then apply the freshness discipline to the stored replica.
    pub async fn active_credential(&self, page_url: &Url) -> BridgeResult<Option<Credential>> {
        if let Err(e) = self.read_incoming_credential(page_url) {
            // A bad handoff does not invalidate a replica that already works
            debug!(error = %e, "ignoring malformed handoff, falling back to stored replica");
        }
        Ok(self.refresher.ensure_fresh().await?)
    }

    /// Drop this origin's replica. Server-side sign-out is the daemon's
    /// business; the bridge only forgets what it holds.
    pub fn sign_out(&self) -> BridgeResult<()> {
        self.store.clear_credential()?;
        self.store.clear_authorization()?;
        info!("bridge replica cleared");
        Ok(())
    }
}
