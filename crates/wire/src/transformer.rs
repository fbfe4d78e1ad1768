//! Wire transformer.
//!
//! Payloads are JSON in which dates and binary buffers travel inside
//! `{"$date": ...}` / `{"$bytes": ...}` wrappers (see
//! [`notesync_core::tagged`]). Typed values pick the wrappers up through
//! their serde attributes; this module is the single entry point for turning
//! bytes into typed values and back, plus helpers for inspecting wrapped
//! values inside untyped rows.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use notesync_core::tagged::{self, BYTES_TAG, DATE_TAG};
use notesync_core::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encode a typed value to its wire JSON.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> SyncResult<Value> {
    serde_json::to_value(value).map_err(|e| SyncError::serialization(e.to_string()))
}

/// Decode wire JSON into a typed value.
pub fn deserialize<T: DeserializeOwned>(value: Value) -> SyncResult<T> {
    serde_json::from_value(value).map_err(|e| SyncError::serialization(e.to_string()))
}

/// Encode a typed value to wire bytes.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| SyncError::serialization(e.to_string()))
}

/// Decode wire bytes into a typed value.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> SyncResult<T> {
    serde_json::from_slice(bytes).map_err(|e| SyncError::serialization(e.to_string()))
}

/// Wrap a timestamp as `{"$date": ...}`.
pub fn date_value(at: &DateTime<Utc>) -> Value {
    serde_json::json!({ DATE_TAG: tagged::format_date(at) })
}

/// Wrap a buffer as `{"$bytes": ...}`.
pub fn bytes_value(bytes: &[u8]) -> Value {
    serde_json::json!({ BYTES_TAG: STANDARD.encode(bytes) })
}

/// Read a `{"$date": ...}` wrapper. Plain RFC 3339 strings are accepted too.
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::Object(map) if map.len() == 1 => map.get(DATE_TAG)?.as_str()?,
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    tagged::parse_date(raw).ok()
}

/// Read a `{"$bytes": ...}` wrapper.
pub fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            STANDARD.decode(map.get(BYTES_TAG)?.as_str()?).ok()
        }
        _ => None,
    }
}
