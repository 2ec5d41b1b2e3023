//! Entitlement check handlers.

use crate::app::DaemonState;
use mailsift_ipc::{IpcServer, Method, Response};

/// Register the authorization handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    // Cached check: answered from memory inside the TTL
    let check_state = state.clone();
    server
        .register_handler(Method::AuthorizationCheck, move |req| {
            let state = check_state.clone();
            async move {
                let authorized = state.entitlement.check_authorized(false).await;
                let (_, last_checked_at) = state.entitlement.cached();
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "authorized": authorized,
                        "last_checked_at": last_checked_at.map(|t| t.to_rfc3339()),
                    }),
                )
            }
        })
        .await;

    // Forced recheck: always goes remote
    server
        .register_handler(Method::AuthorizationRefresh, move |req| {
            let state = state.clone();
            async move {
                let authorized = state.entitlement.check_authorized(true).await;
                Response::success(&req.id, serde_json::json!({ "authorized": authorized }))
            }
        })
        .await;
}
