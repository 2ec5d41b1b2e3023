//! Forced refresh and external session-update handlers.

use crate::app::DaemonState;
use mailsift_auth::RefreshOutcome;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use mailsift_storage::Credential;
use tracing::info;

/// Register the refresh and session-updated handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    // Forced refresh: runs (or joins) the shared exchange regardless of
    // staleness.
    let refresh_state = state.clone();
    server
        .register_handler(Method::AuthRefreshToken, move |req| {
            let state = refresh_state.clone();
            async move {
                match state.refresher.force_refresh().await {
                    RefreshOutcome::Refreshed(credential) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "refreshed": true,
                            "expires_at": credential.expires_at,
                        }),
                    ),
                    RefreshOutcome::Rejected => Response::error(
                        &req.id,
                        error_codes::NOT_AUTHENTICATED,
                        "Refresh token rejected, sign in again",
                    ),
                    RefreshOutcome::Failed(message) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &message)
                    }
                }
            }
        })
        .await;

    // A browser session signed in (or re-signed-in) out of band and pushes
    // its credential to the daemon.
    server
        .register_handler(Method::AuthSessionUpdated, move |req| {
            let state = state.clone();
            async move {
                let Some(params) = req.params.clone() else {
                    return Response::error(
                        &req.id,
                        error_codes::INVALID_PARAMS,
                        "credential is required",
                    );
                };
                let credential: Credential = match serde_json::from_value(params) {
                    Ok(credential) => credential,
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            &format!("malformed credential: {}", e),
                        )
                    }
                };
                if !credential.is_usable() {
                    return Response::error(
                        &req.id,
                        error_codes::INVALID_PARAMS,
                        "credential is missing a token or user",
                    );
                }

                if let Err(e) = state.credentials.set_credential(&credential) {
                    return Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string());
                }
                state.entitlement.invalidate();
                info!(user_id = %credential.user.id, "Session updated from external sign-in");

                Response::success(&req.id, serde_json::json!({ "updated": true }))
            }
        })
        .await;
}
