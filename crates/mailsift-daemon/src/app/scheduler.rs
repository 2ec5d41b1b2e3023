//! Periodic background work: token refresh and entitlement recheck.

use crate::app::DaemonState;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the daemon proactively refreshes a stale credential. Half the
/// staleness buffer, so a token is never handed out inside its last window.
const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How often the cached entitlement verdict is re-confirmed remotely.
const ENTITLEMENT_RECHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Start the scheduler task. It stops when the server broadcasts shutdown.
pub fn start(state: DaemonState, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut refresh_tick = tokio::time::interval(TOKEN_REFRESH_INTERVAL);
        let mut entitlement_tick = tokio::time::interval(ENTITLEMENT_RECHECK_INTERVAL);
        // Intervals fire immediately; startup already validated the session
        refresh_tick.tick().await;
        entitlement_tick.tick().await;

        info!("Scheduler started");

        loop {
            tokio::select! {
                _ = refresh_tick.tick() => {
                    match state.refresher.ensure_fresh().await {
                        Ok(Some(_)) => debug!("Scheduled refresh: session fresh"),
                        Ok(None) => debug!("Scheduled refresh: no active session"),
                        Err(e) => warn!(error = %e, "Scheduled refresh failed"),
                    }
                }
                _ = entitlement_tick.tick() => {
                    if state.credentials.has_credential().unwrap_or(false) {
                        let authorized = state.entitlement.check_authorized(true).await;
                        debug!(authorized, "Scheduled entitlement recheck");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler stopping");
                    break;
                }
            }
        }
    })
}
