//! Shared parameter plumbing for auth handlers.

use mailsift_ipc::{error_codes, Request, Response};

/// Pull a required string parameter, or build the INVALID_PARAMS response.
pub fn required_str(req: &Request, key: &str) -> Result<String, Response> {
    req.params
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            Response::error(
                &req.id,
                error_codes::INVALID_PARAMS,
                &format!("{} is required", key),
            )
        })
}
