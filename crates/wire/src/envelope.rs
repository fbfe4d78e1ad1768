//! Success envelope.
//!
//! Every procedure answers `{"result":{"data": <payload>}}`. Offline
//! fallbacks synthesize the same shape so callers cannot tell a cached answer
//! from a live one except through the [`CACHE_HEADER`] marker.

use notesync_core::{SyncError, SyncResult};
use serde_json::Value;

use crate::http::HttpResponse;

/// Header set on responses synthesized from the local store.
pub const CACHE_HEADER: &str = "x-notesync-cache";
/// Value of [`CACHE_HEADER`].
pub const CACHE_HIT: &str = "hit";

/// Wrap a payload in the success envelope.
pub fn wrap(data: Value) -> Value {
    serde_json::json!({ "result": { "data": data } })
}

/// Extract the payload from an envelope.
pub fn unwrap(envelope: Value) -> SyncResult<Value> {
    match envelope {
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Object(mut result)) => result
                .remove("data")
                .ok_or_else(|| SyncError::serialization("envelope has no result.data")),
            _ => Err(SyncError::serialization("envelope has no result")),
        },
        _ => Err(SyncError::serialization("envelope is not an object")),
    }
}

/// Parse a response body and extract its payload.
pub fn unwrap_body(body: &[u8]) -> SyncResult<Value> {
    let envelope: Value =
        serde_json::from_slice(body).map_err(|e| SyncError::serialization(e.to_string()))?;
    unwrap(envelope)
}

/// A 200 JSON response carrying `data`, marked as served from cache.
pub fn cached_response(data: Value) -> SyncResult<HttpResponse> {
    Ok(HttpResponse::json(&wrap(data))?.with_header(CACHE_HEADER, CACHE_HIT))
}

/// A 200 JSON response carrying `data` (used by passthrough providers).
pub fn live_response(data: Value) -> SyncResult<HttpResponse> {
    HttpResponse::json(&wrap(data))
}

/// Whether a response was synthesized from the local store.
pub fn is_cached(response: &HttpResponse) -> bool {
    response.header(CACHE_HEADER) == Some(CACHE_HIT)
}
