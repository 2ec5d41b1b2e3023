//! Password sign-in handler.

use crate::app::DaemonState;
use crate::auth::common::required_str;
use mailsift_auth::{AuthError, IdentityProvider};
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use tracing::info;

/// Register the sign-in handler.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::AuthSignIn, move |req| {
            let state = state.clone();
            async move {
                let email = match required_str(&req, "email") {
                    Ok(v) => v,
                    Err(response) => return response,
                };
                let password = match required_str(&req, "password") {
                    Ok(v) => v,
                    Err(response) => return response,
                };

                let credential = match state.identity.sign_in(email, password).await {
                    Ok(credential) => credential,
                    Err(AuthError::InvalidCredentials(message)) => {
                        return Response::error(&req.id, error_codes::NOT_AUTHENTICATED, &message)
                    }
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INTERNAL_ERROR,
                            &e.to_string(),
                        )
                    }
                };

                if let Err(e) = state.credentials.set_credential(&credential) {
                    return Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string());
                }

                // Fresh session, stale verdict: next check goes remote
                state.entitlement.invalidate();
                info!(user_id = %credential.user.id, "User signed in");

                Response::success(
                    &req.id,
                    serde_json::json!({
                        "user_id": credential.user.id,
                        "email": credential.user.email,
                        "expires_at": credential.expires_at,
                    }),
                )
            }
        })
        .await;
}
