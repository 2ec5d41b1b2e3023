//! Settings handlers.

use crate::app::DaemonState;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use mailsift_storage::CredentialStore;
use tracing::info;

/// Register the settings handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    let get_state = state.clone();
    server
        .register_handler(Method::SettingsGet, move |req| {
            let state = get_state.clone();
            async move {
                match settings_json(&state.credentials) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e),
                }
            }
        })
        .await;

    server
        .register_handler(Method::SettingsSet, move |req| {
            let state = state.clone();
            async move {
                let auto_sync = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("auto_sync"))
                    .and_then(|v| v.as_bool());

                if let Some(enabled) = auto_sync {
                    if let Err(e) = state.credentials.set_auto_sync(enabled) {
                        return Response::error(
                            &req.id,
                            error_codes::INTERNAL_ERROR,
                            &e.to_string(),
                        );
                    }
                    info!(enabled, "Auto-sync setting updated");
                }

                match settings_json(&state.credentials) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e),
                }
            }
        })
        .await;
}

fn settings_json(credentials: &CredentialStore) -> Result<serde_json::Value, String> {
    let auto_sync = credentials.auto_sync_enabled().map_err(|e| e.to_string())?;
    let last_sync_error = credentials.last_sync_error().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "auto_sync": auto_sync,
        "last_sync_error": last_sync_error,
    }))
}
