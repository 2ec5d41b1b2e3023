//! Sync handler.

use crate::app::DaemonState;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};

/// Register the sync handler. The report is the result either way; the
/// engine never throws past its own boundary.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::SyncNow, move |req| {
            let state = state.clone();
            async move {
                let report = state.sync.sync_now().await;
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
