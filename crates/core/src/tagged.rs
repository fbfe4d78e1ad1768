//! Special wrappers for values JSON cannot carry natively.
//!
//! Dates travel as `{"$date": "<RFC 3339>"}` and binary buffers as
//! `{"$bytes": "<base64>"}`. Entity fields opt in with
//! `#[serde(with = "tagged::date")]` / `#[serde(with = "tagged::bytes")]`,
//! so the same encoding is used on the wire and inside the local store.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wrapper key for dates.
pub const DATE_TAG: &str = "$date";
/// Wrapper key for binary buffers.
pub const BYTES_TAG: &str = "$bytes";

#[derive(Serialize, Deserialize)]
struct DateRepr {
    #[serde(rename = "$date")]
    date: String,
}

#[derive(Serialize, Deserialize)]
struct BytesRepr {
    #[serde(rename = "$bytes")]
    bytes: String,
}

/// Format a timestamp the way the `$date` wrapper carries it.
pub fn format_date(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a `$date` payload.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc))
}

/// `$date` wrapper for `DateTime<Utc>` fields.
pub mod date {
    use super::*;

    /// Serialize as `{"$date": ...}`.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        DateRepr {
            date: format_date(value),
        }
        .serialize(s)
    }

    /// Deserialize from `{"$date": ...}`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let repr = DateRepr::deserialize(d)?;
        parse_date(&repr.date).map_err(D::Error::custom)
    }
}

/// `$date` wrapper for `Option<DateTime<Utc>>` fields (`None` is `null`).
pub mod option_date {
    use super::*;

    /// Serialize as `{"$date": ...}` or `null`.
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(|v| DateRepr {
                date: format_date(v),
            })
            .serialize(s)
    }

    /// Deserialize from `{"$date": ...}` or `null`.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<DateRepr>::deserialize(d)? {
            Some(repr) => parse_date(&repr.date).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

/// `$bytes` wrapper for `Vec<u8>` fields.
pub mod bytes {
    use super::*;

    /// Serialize as `{"$bytes": <base64>}`.
    pub fn serialize<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
        BytesRepr {
            bytes: STANDARD.encode(value),
        }
        .serialize(s)
    }

    /// Deserialize from `{"$bytes": <base64>}`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let repr = BytesRepr::deserialize(d)?;
        STANDARD.decode(repr.bytes).map_err(D::Error::custom)
    }
}
