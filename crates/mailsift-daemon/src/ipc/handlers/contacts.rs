//! Local contact collection handlers.

use crate::app::DaemonState;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use tracing::info;

const DEFAULT_PULL_LIMIT: u32 = 100;

/// Register the contacts handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    // Full local snapshot
    let get_state = state.clone();
    server
        .register_handler(Method::ContactsGet, move |req| {
            let state = get_state.clone();
            async move {
                match state.captures.snapshot() {
                    Ok(contacts) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "count": contacts.len(),
                            "contacts": contacts,
                        }),
                    ),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;

    // Drop the local collection; remote data is untouched
    let clear_state = state.clone();
    server
        .register_handler(Method::ContactsClear, move |req| {
            let state = clear_state.clone();
            async move {
                match state.captures.clear_all() {
                    Ok(()) => {
                        info!("Local contact collection cleared");
                        Response::success(&req.id, serde_json::json!({ "cleared": true }))
                    }
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;

    // Pull a page of remote contacts and merge it in
    server
        .register_handler(Method::ContactsPull, move |req| {
            let state = state.clone();
            async move {
                let limit = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("limit"))
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(DEFAULT_PULL_LIMIT);
                let offset = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("offset"))
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(0);

                let report = state.sync.pull_remote(limit, offset).await;
                match serde_json::to_value(&report) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;
}
