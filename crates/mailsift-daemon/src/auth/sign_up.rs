//! Account creation handler.

use crate::app::DaemonState;
use crate::auth::common::required_str;
use mailsift_auth::{AuthError, IdentityProvider};
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use tracing::info;

/// Register the sign-up handler.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::AuthSignUp, move |req| {
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

                let outcome = match state.identity.sign_up(email, password).await {
                    Ok(outcome) => outcome,
                    Err(AuthError::InvalidCredentials(message)) => {
                        return Response::error(&req.id, error_codes::INVALID_PARAMS, &message)
                    }
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INTERNAL_ERROR,
                            &e.to_string(),
                        )
                    }
                };

                // Auto-confirmed accounts arrive with a session; persist it
                let signed_in = match &outcome.credential {
                    Some(credential) => {
                        if let Err(e) = state.credentials.set_credential(credential) {
                            return Response::error(
                                &req.id,
                                error_codes::INTERNAL_ERROR,
                                &e.to_string(),
                            );
                        }
                        state.entitlement.invalidate();
                        true
                    }
                    None => false,
                };

                info!(user_id = %outcome.user.id, signed_in, "Account created");

                Response::success(
                    &req.id,
                    serde_json::json!({
                        "user_id": outcome.user.id,
                        "email": outcome.user.email,
                        "signed_in": signed_in,
                    }),
                )
            }
        })
        .await;
}
