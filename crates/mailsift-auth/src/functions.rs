//! Edge-functions client: entitlement checks, contact storage, billing.

use crate::outcome::{ApiFailure, ApiResult};
use crate::traits::{
    ContactBackend, ContactPage, EntitlementBackend, StoreReceipt, SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use mailsift_storage::CapturedContact;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// REST client for the project's edge functions.
///
/// Every call carries the caller's bearer token; a 401/403 is surfaced as
/// [`ApiFailure::Unauthorized`] so the caller can apply the
/// refresh-and-retry-once policy.
#[derive(Clone)]
pub struct FunctionsClient {
    http_client: reqwest::Client,
    functions_url: String,
    publishable_key: String,
}

#[derive(Serialize)]
struct StoreRequest {
    emails: Vec<WireContact>,
}

/// Row shape the remote store expects.
#[derive(Serialize)]
struct WireContact {
    email: String,
    domain: String,
    urls: Vec<String>,
    first_seen: String,
    last_seen: String,
}

impl From<&CapturedContact> for WireContact {
    fn from(contact: &CapturedContact) -> Self {
        WireContact {
            email: contact.email.clone(),
            domain: contact.domain.clone(),
            urls: contact.source_urls.clone(),
            first_seen: contact.first_seen_at.to_rfc3339(),
            last_seen: contact.last_seen_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
struct StoreResponse {
    count: Option<usize>,
}

#[derive(Deserialize)]
struct FetchResponse {
    emails: Vec<RemoteContact>,
    #[serde(default)]
    count: Option<usize>,
}

/// Remote row shape for a stored contact.
#[derive(Deserialize)]
struct RemoteContact {
    email: String,
    domain: Option<String>,
    url: Option<String>,
    urls: Option<Vec<String>>,
    first_seen: Option<String>,
    last_seen: Option<String>,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Serialize)]
struct PortalRequest<'a> {
    #[serde(rename = "returnUrl")]
    return_url: &'a str,
}

impl RemoteContact {
    fn into_contact(self) -> Option<CapturedContact> {
        let domain = match self.domain {
            Some(d) => d,
            None => self.email.split_once('@')?.1.to_string(),
        };
        let source_urls = match self.urls {
            Some(urls) => urls,
            None => self.url.into_iter().collect(),
        };
        let first_seen_at = parse_instant(self.first_seen.as_deref())?;
        let last_seen_at = parse_instant(self.last_seen.as_deref()).unwrap_or(first_seen_at);

        Some(CapturedContact {
            email: self.email,
            domain,
            source_urls,
            first_seen_at,
            last_seen_at,
        })
    }
}

fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl FunctionsClient {
    pub fn new(functions_url: &str, publishable_key: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            functions_url: functions_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.functions_url, name)
    }

    async fn classify_failure(response: reqwest::Response) -> ApiFailure {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return ApiFailure::Unauthorized;
        }
        let message = response.text().await.unwrap_or_default();
        ApiFailure::Status {
            status: status.as_u16(),
            message,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        access_token: String,
    ) -> ApiResult<T> {
        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiFailure::Transport(format!("malformed response: {}", e)))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        access_token: String,
        body: &B,
    ) -> ApiResult<T> {
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiFailure::Transport(format!("malformed response: {}", e)))
    }

    async fn post_empty<B: Serialize>(
        &self,
        url: String,
        access_token: String,
        body: &B,
    ) -> ApiResult<()> {
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        Ok(())
    }

    async fn do_check_subscription(&self, access_token: String) -> ApiResult<SubscriptionStatus> {
        self.get_json(self.endpoint("check-subscription"), access_token)
            .await
    }

    async fn do_store_contacts(
        &self,
        contacts: Vec<CapturedContact>,
        access_token: String,
    ) -> ApiResult<StoreReceipt> {
        let submitted = contacts.len();
        let request = StoreRequest {
            emails: contacts.iter().map(WireContact::from).collect(),
        };
        let response: StoreResponse = self
            .post_json(self.endpoint("store-emails"), access_token, &request)
            .await?;

        Ok(StoreReceipt {
            count: response.count.unwrap_or(submitted),
        })
    }

    async fn do_fetch_contacts(
        &self,
        limit: u32,
        offset: u32,
        access_token: String,
    ) -> ApiResult<ContactPage> {
        let url = format!(
            "{}?limit={}&offset={}",
            self.endpoint("get-emails"),
            limit,
            offset
        );
        let response: FetchResponse = self.get_json(url, access_token).await?;

        let fetched = response.emails.len();
        let contacts: Vec<CapturedContact> = response
            .emails
            .into_iter()
            .filter_map(RemoteContact::into_contact)
            .collect();
        if contacts.len() < fetched {
            warn!(
                dropped = fetched - contacts.len(),
                "skipped remote contacts with unparseable fields"
            );
        }

        let total = response.count.unwrap_or(contacts.len());
        Ok(ContactPage { contacts, total })
    }

    /// Start a checkout flow; returns the URL to open.
    pub async fn create_checkout(&self, access_token: String) -> ApiResult<String> {
        let response: UrlResponse = self
            .post_json(
                self.endpoint("create-checkout"),
                access_token,
                &serde_json::json!({}),
            )
            .await?;
        Ok(response.url)
    }

    /// Open the billing portal; returns the URL to open.
    pub async fn create_portal_session(
        &self,
        access_token: String,
        return_url: String,
    ) -> ApiResult<String> {
        let response: UrlResponse = self
            .post_json(
                self.endpoint("create-portal-session"),
                access_token,
                &PortalRequest {
                    return_url: &return_url,
                },
            )
            .await?;
        Ok(response.url)
    }

    pub async fn cancel_subscription(&self, access_token: String) -> ApiResult<()> {
        self.post_empty(
            self.endpoint("cancel-subscription"),
            access_token,
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn resume_subscription(&self, access_token: String) -> ApiResult<()> {
        self.post_empty(
            self.endpoint("resume-subscription"),
            access_token,
            &serde_json::json!({}),
        )
        .await
    }
}

impl EntitlementBackend for FunctionsClient {
    fn check_subscription(
        &self,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<SubscriptionStatus>> {
        let client = self.clone();
        Box::pin(async move { client.do_check_subscription(access_token).await })
    }
}

impl ContactBackend for FunctionsClient {
    fn store_contacts(
        &self,
        contacts: Vec<CapturedContact>,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<StoreReceipt>> {
        let client = self.clone();
        Box::pin(async move { client.do_store_contacts(contacts, access_token).await })
    }

    fn fetch_contacts(
        &self,
        limit: u32,
        offset: u32,
        access_token: String,
    ) -> BoxFuture<'static, ApiResult<ContactPage>> {
        let client = self.clone();
        Box::pin(async move { client.do_fetch_contacts(limit, offset, access_token).await })
    }
}
