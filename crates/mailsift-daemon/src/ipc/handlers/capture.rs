//! Capture handler.

use crate::app::DaemonState;
use chrono::Utc;
use mailsift_ipc::{error_codes, IpcServer, Method, Response};
use mailsift_sync::CaptureReceipt;

/// Register the capture handler.
///
/// Accepts either an `addresses` array (pre-extracted by the scraper) or
/// raw `text` to run through the fallback extractor, plus the `source_url`
/// the sighting came from.
pub async fn register(server: &IpcServer, state: DaemonState) {
    server
        .register_handler(Method::CaptureRecord, move |req| {
            let state = state.clone();
            async move {
                let source_url = match req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("source_url"))
                    .and_then(|v| v.as_str())
                {
                    Some(url) => url.to_string(),
                    None => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            "source_url is required",
                        )
                    }
                };

                let addresses: Option<Vec<String>> = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("addresses"))
                    .and_then(|v| v.as_array())
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(String::from)
                            .collect()
                    });
                let text = req
                    .params
                    .as_ref()
                    .and_then(|p| p.get("text"))
                    .and_then(|v| v.as_str());

                let observed_at = Utc::now();
                let receipt = match (&addresses, text) {
                    (Some(addresses), _) => {
                        state
                            .capture_service
                            .record_from_page(addresses, &source_url, observed_at)
                            .await
                    }
                    (None, Some(text)) => {
                        state
                            .capture_service
                            .record_from_text(text, &source_url, observed_at)
                            .await
                    }
                    (None, None) => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            "addresses or text is required",
                        )
                    }
                };

                match receipt {
                    Ok(receipt) => Response::success(&req.id, receipt_json(&receipt)),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;
}

fn receipt_json(receipt: &CaptureReceipt) -> serde_json::Value {
    serde_json::json!({
        "authorized": receipt.authorized,
        "captured": receipt.captured,
        "total_stored": receipt.total_stored,
        "newly_added": receipt.newly_added,
    })
}
