//! Credential and captured-contact data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated identity a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Provider-assigned user id.
    pub id: String,
    /// Email the account was registered with, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A bearer credential issued by the identity provider.
///
/// Mutated only by wholesale replacement; cleared only on definitive
/// rejection by the provider or explicit sign-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque bearer token.
    pub access_token: String,
    /// Absent for credentials that cannot be renewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch seconds after which the access token must be treated as invalid.
    pub expires_at: i64,
    /// Identity the tokens belong to.
    pub user: UserIdentity,
}

impl Credential {
    /// A credential is usable iff its access token and user id are present.
    /// Expiry does not make it unusable; the server is the final arbiter.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && !self.user.id.is_empty()
    }

    /// Stale iff `now` is within `buffer_secs` of the expiry instant or past it.
    pub fn is_stale(&self, now_epoch_secs: i64, buffer_secs: i64) -> bool {
        now_epoch_secs >= self.expires_at - buffer_secs
    }
}

/// One captured email contact, unique per normalized address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedContact {
    /// Normalized (lowercased, trimmed) address.
    pub email: String,
    /// Substring after the `@`.
    pub domain: String,
    /// Pages the address was sighted on, insertion-ordered, no duplicates.
    pub source_urls: Vec<String>,
    /// Instant of the earliest sighting. Never decreases.
    pub first_seen_at: DateTime<Utc>,
    /// Instant of the latest sighting.
    pub last_seen_at: DateTime<Utc>,
}

impl CapturedContact {
    /// Fold another sighting of the same address into this record.
    pub fn merge_sighting(&mut self, source_url: &str, observed_at: DateTime<Utc>) {
        if observed_at < self.first_seen_at {
            self.first_seen_at = observed_at;
        }
        if observed_at > self.last_seen_at {
            self.last_seen_at = observed_at;
        }
        if !self.source_urls.iter().any(|u| u == source_url) {
            self.source_urls.push(source_url.to_string());
        }
    }

    /// Merge an already-aggregated record (e.g. fetched from the remote store)
    /// under the same laws: earliest first-seen, latest last-seen, URL union.
    pub fn merge_record(&mut self, other: &CapturedContact) {
        if other.first_seen_at < self.first_seen_at {
            self.first_seen_at = other.first_seen_at;
        }
        if other.last_seen_at > self.last_seen_at {
            self.last_seen_at = other.last_seen_at;
        }
        for url in &other.source_urls {
            if !self.source_urls.iter().any(|u| u == url) {
                self.source_urls.push(url.clone());
            }
        }
    }
}

/// Normalize an address for use as the contact key.
pub(crate) fn normalize_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}
