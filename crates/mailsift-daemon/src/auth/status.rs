//! Session status handler.

use crate::app::DaemonState;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};

/// Register the auth status handler.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::AuthStatus, move |req| {
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
                let authorized = state.credentials.authorized().unwrap_or(false);

                match credential {
                    Some(credential) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "authenticated": true,
                            "user_id": credential.user.id,
                            "email": credential.user.email,
                            "expires_at": credential.expires_at,
                            "authorized": authorized,
                        }),
                    ),
                    None => Response::success(
                        &req.id,
                        serde_json::json!({
                            "authenticated": false,
                            "authorized": false,
                        }),
                    ),
                }
            }
        })
        .await;
}
