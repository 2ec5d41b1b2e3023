//! Supabase-auth-shaped identity provider client.

use crate::outcome::{RefreshExchange, RefreshGrant};
use crate::traits::{IdentityProvider, SignUpOutcome};
use crate::{AuthError, AuthResult};
use chrono::Utc;
use futures_util::future::BoxFuture;
use mailsift_storage::{Credential, UserIdentity};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request timeout; a timed-out call classifies as transient.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifetime assumed when the provider reports neither expires_at nor
/// expires_in.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 3600;

/// REST client for the identity provider's auth endpoints.
#[derive(Clone)]
pub struct SupabaseIdentity {
    http_client: reqwest::Client,
    auth_url: String,
    publishable_key: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<WireUser>,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct SignUpResponse {
    // Auto-confirmed accounts get a session inline
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<WireUser>,
    // Confirmation-pending accounts return the bare user object
    id: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl From<WireUser> for UserIdentity {
    fn from(user: WireUser) -> Self {
        UserIdentity {
            id: user.id,
            email: user.email,
        }
    }
}

impl SupabaseIdentity {
    pub fn new(supabase_url: &str, publishable_key: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            auth_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            publishable_key: publishable_key.to_string(),
        }
    }

    fn expires_at_from(expires_at: Option<i64>, expires_in: Option<i64>) -> i64 {
        match expires_at {
            Some(at) => at,
            None => Utc::now().timestamp() + expires_in.unwrap_or(FALLBACK_TOKEN_LIFETIME_SECS),
        }
    }

    /// Pull a human-readable message out of a provider error body.
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            if let Some(msg) = parsed
                .error_description
                .or(parsed.msg)
                .or(parsed.message)
            {
                return msg;
            }
        }
        format!("provider returned {}", status)
    }

    async fn do_exchange(&self, refresh_token: String) -> RefreshExchange {
        let url = format!("{}/token?grant_type=refresh_token", self.auth_url);

        let result = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => return RefreshExchange::Transient(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<TokenResponse>().await {
                Ok(token) => RefreshExchange::Granted(RefreshGrant {
                    expires_at: Self::expires_at_from(token.expires_at, token.expires_in),
                    access_token: token.access_token,
                    refresh_token: token.refresh_token,
                    user: token.user.map(UserIdentity::from),
                }),
                Err(e) => RefreshExchange::Transient(format!("malformed token response: {}", e)),
            }
        } else if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let message = Self::error_message(response).await;
            debug!(status = %status, message = %message, "refresh token rejected");
            RefreshExchange::Denied(message)
        } else {
            RefreshExchange::Transient(format!("refresh endpoint returned {}", status))
        }
    }

    async fn do_sign_in(&self, email: String, password: String) -> AuthResult<Credential> {
        let url = format!("{}/token?grant_type=password", self.auth_url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&PasswordRequest {
                email: &email,
                password: &password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidCredentials(
                Self::error_message(response).await,
            ));
        }

        let token: TokenResponse = response.json().await?;
        let user = token
            .user
            .map(UserIdentity::from)
            .ok_or_else(|| AuthError::Provider("sign-in response missing user".to_string()))?;

        Ok(Credential {
            expires_at: Self::expires_at_from(token.expires_at, token.expires_in),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user,
        })
    }

    async fn do_sign_up(&self, email: String, password: String) -> AuthResult<SignUpOutcome> {
        let url = format!("{}/signup", self.auth_url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&PasswordRequest {
                email: &email,
                password: &password,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidCredentials(
                Self::error_message(response).await,
            ));
        }

        let body: SignUpResponse = response.json().await?;

        let user = match (body.user, body.id) {
            (Some(wire), _) => UserIdentity::from(wire),
            (None, Some(id)) => UserIdentity {
                id,
                email: body.email,
            },
            (None, None) => {
                return Err(AuthError::Provider(
                    "sign-up response missing user".to_string(),
                ))
            }
        };

        let credential = body.access_token.map(|access_token| Credential {
            expires_at: Self::expires_at_from(body.expires_at, body.expires_in),
            access_token,
            refresh_token: body.refresh_token,
            user: user.clone(),
        });

        Ok(SignUpOutcome { user, credential })
    }

    async fn do_sign_out(&self, access_token: String) {
        let url = format!("{}/logout", self.auth_url);

        let result = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;

        if let Err(e) = result {
            warn!(error = %e, "server-side sign-out failed, local state cleared anyway");
        }
    }

    async fn do_fetch_user(&self, access_token: String) -> AuthResult<UserIdentity> {
        let url = format!("{}/user", self.auth_url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::SessionInvalid);
        }
        if !status.is_success() {
            return Err(AuthError::Provider(Self::error_message(response).await));
        }

        let user: WireUser = response.json().await?;
        Ok(UserIdentity::from(user))
    }
}

impl IdentityProvider for SupabaseIdentity {
    fn exchange_refresh_token(&self, refresh_token: String) -> BoxFuture<'static, RefreshExchange> {
        let client = self.clone();
        Box::pin(async move { client.do_exchange(refresh_token).await })
    }

    fn sign_in(
        &self,
        email: String,
        password: String,
    ) -> BoxFuture<'static, AuthResult<Credential>> {
        let client = self.clone();
        Box::pin(async move { client.do_sign_in(email, password).await })
    }

    fn sign_up(
        &self,
        email: String,
        password: String,
    ) -> BoxFuture<'static, AuthResult<SignUpOutcome>> {
        let client = self.clone();
        Box::pin(async move { client.do_sign_up(email, password).await })
    }

    fn sign_out(&self, access_token: String) -> BoxFuture<'static, ()> {
        let client = self.clone();
        Box::pin(async move { client.do_sign_out(access_token).await })
    }

    fn fetch_user(&self, access_token: String) -> BoxFuture<'static, AuthResult<UserIdentity>> {
        let client = self.clone();
        Box::pin(async move { client.do_fetch_user(access_token).await })
    }
}
