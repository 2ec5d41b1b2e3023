//! One-time URL credential handoff codec.
//!
//! The daemon opens the dashboard with `?session=<base64(JSON credential)>`;
//! the dashboard decodes the parameter once and strips it from the visible
//! URL. Base64 keeps the JSON safe inside a query string; the url crate
//! percent-encodes the padding.

use crate::{BridgeError, BridgeResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mailsift_storage::Credential;
use url::Url;

/// Query parameter carrying the handoff.
pub const SESSION_PARAM: &str = "session";

/// Build a dashboard URL carrying the credential handoff.
pub fn encode_handoff_url(origin: &Url, credential: &Credential) -> BridgeResult<Url> {
    let json = serde_json::to_string(credential).map_err(|e| BridgeError::Handoff(e.to_string()))?;
    let encoded = STANDARD.encode(json);

    let mut url = origin.clone();
    url.query_pairs_mut().append_pair(SESSION_PARAM, &encoded);
    Ok(url)
}

/// The raw handoff parameter, if the URL carries one.
pub fn handoff_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == SESSION_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Decode a handoff parameter back into a credential.
pub fn decode_handoff(param: &str) -> BridgeResult<Credential> {
    let bytes = STANDARD
        .decode(param)
        .map_err(|e| BridgeError::Handoff(format!("invalid base64: {}", e)))?;
    let credential: Credential = serde_json::from_slice(&bytes)
        .map_err(|e| BridgeError::Handoff(format!("invalid credential payload: {}", e)))?;
    Ok(credential)
}

/// The URL with the handoff parameter removed; all other query pairs are
/// preserved in order.
pub fn strip_handoff(url: &Url) -> Url {
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SESSION_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if remaining.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned
            .query_pairs_mut()
            .clear()
            .extend_pairs(remaining.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    cleaned
}
