//! Sign-out handler.

use crate::app::DaemonState;
use mailsift_auth::IdentityProvider;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use tracing::info;

/// Register the sign-out handler. Local state is cleared even when the
/// server-side revocation fails.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::AuthSignOut, move |req| {
            let state = state.clone();
            async move {
                let credential = match state.credentials.credential() {
                    Ok(c) => c,
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INTERNAL_ERROR,
                            &e.to_string(),
                        )
                    }
                };

                if let Some(credential) = credential {
                    // Best-effort server-side revocation
                    state.identity.sign_out(credential.access_token).await;
                }

                if let Err(e) = state.credentials.clear_credential() {
                    return Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string());
                }
                if let Err(e) = state.credentials.clear_authorization() {
                    return Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string());
                }
                state.entitlement.invalidate();

                info!("User signed out");
                Response::success(&req.id, serde_json::json!({ "signed_out": true }))
            }
        })
        .await;
}
