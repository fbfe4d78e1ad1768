//! Procedure inputs.
//!
//! Queries carry their input in the `input` URL query parameter as
//! transformer-encoded JSON; mutations carry it as the JSON request body.
//! The typed structs below are what handlers consume.

use notesync_core::{SyncError, SyncResult};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::http::HttpRequest;
use crate::transformer;

/// Name of the query parameter holding a query's input.
pub const INPUT_PARAM: &str = "input";

/// Origin used to resolve same-origin paths.
const LOCAL_ORIGIN: &str = "http://localhost/";

/// Parse a URL that may be absolute or a same-origin path.
pub fn parse_url(raw: &str) -> SyncResult<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(LOCAL_ORIGIN)
            .and_then(|base| base.join(raw))
            .map_err(|e| SyncError::invalid_input(format!("bad url {raw:?}: {e}"))),
        Err(e) => Err(SyncError::invalid_input(format!("bad url {raw:?}: {e}"))),
    }
}

/// Decode the `input` query parameter, if present.
pub fn query_input(url: &Url) -> SyncResult<Option<Value>> {
    match url.query_pairs().find(|(k, _)| k == INPUT_PARAM) {
        Some((_, raw)) => transformer::from_bytes(raw.as_bytes())
            .map(Some)
            .map_err(|e| SyncError::invalid_input(format!("malformed input parameter: {e}"))),
        None => Ok(None),
    }
}

/// Encode `input` into a query string value for `url`.
pub fn with_query_input(url: &str, input: &Value) -> SyncResult<String> {
    let mut parsed = parse_url(url)?;
    let encoded = transformer::serialize(input)?.to_string();
    parsed
        .query_pairs_mut()
        .append_pair(INPUT_PARAM, &encoded);
    if url.starts_with('/') {
        let mut out = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            out.push('?');
            out.push_str(q);
        }
        Ok(out)
    } else {
        Ok(parsed.into())
    }
}

/// Raw input of a request: the query parameter for GET, the body otherwise.
pub fn raw_input(request: &HttpRequest) -> SyncResult<Option<Value>> {
    let url = parse_url(&request.url)?;
    match query_input(&url)? {
        Some(input) => Ok(Some(input)),
        None => request.json_body(),
    }
}

/// Input of procedures addressing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ByIdInput {
    /// Artifact id.
    pub id: String,
}

/// Input of `job.getJobs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobsQuery {
    /// Only jobs of this type.
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Page size; the configured default applies when absent.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Input of `search.searchArtifacts`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchInput {
    /// Free-text query.
    pub query: String,
    /// Maximum hits.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Input of `file.uploadFile`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileInput {
    /// Client-generated file id.
    pub id: String,
    /// Artifact the file belongs to.
    pub artifact_id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default = "default_mime")]
    pub mime_type: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

/// Pull a required string field out of a raw input.
pub fn require_str<'a>(
    procedure: &str,
    input: Option<&'a Value>,
    field: &'static str,
) -> SyncResult<&'a str> {
    input
        .and_then(|v| v.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::missing_input(procedure, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_input_decodes_percent_encoded_json() {
        let url = with_query_input("/api/job.getJobs", &json!({"type": "export", "limit": 5}))
            .unwrap();
        assert!(url.starts_with("/api/job.getJobs?input="));
        let input = query_input(&parse_url(&url).unwrap()).unwrap().unwrap();
        let q: JobsQuery = serde_json::from_value(input).unwrap();
        assert_eq!(q.job_type.as_deref(), Some("export"));
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, None);
    }

    #[test]
    fn absolute_urls_keep_origin() {
        let url = with_query_input("https://api.example.com/x", &json!({"id": "a"})).unwrap();
        assert!(url.starts_with("https://api.example.com/x?input="));
    }

    #[test]
    fn malformed_input_is_invalid() {
        let url = parse_url("/api/x?input=%7Bnope").unwrap();
        let err = query_input(&url).unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput { .. }));
    }

    #[test]
    fn wrapped_values_survive_the_query_parameter() {
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let input = json!({"since": transformer::date_value(&at)});
        let url = with_query_input("/api/job.getJobs", &input).unwrap();

        let decoded = query_input(&parse_url(&url).unwrap()).unwrap().unwrap();
        assert_eq!(decoded, input);
        assert_eq!(transformer::as_date(&decoded["since"]), Some(at));
    }

    #[test]
    fn body_is_used_when_no_query() {
        let req = HttpRequest::post_json("/api/file.uploadFile", &json!({"id": "f"})).unwrap();
        assert_eq!(raw_input(&req).unwrap(), Some(json!({"id": "f"})));
        assert_eq!(raw_input(&HttpRequest::get("/api/x")).unwrap(), None);
    }

    #[test]
    fn require_str_reports_missing_field() {
        let input = json!({"id": ""});
        let err = require_str("artifact.getArtifactById", Some(&input), "id").unwrap_err();
        assert!(matches!(err, SyncError::MissingInput { field: "id", .. }));
        assert!(require_str("p", None, "id").is_err());
    }

    proptest::proptest! {
        #[test]
        fn ids_survive_query_encoding(id in "\\PC{1,24}") {
            let url = with_query_input("/api/artifact.getArtifactById", &json!({"id": id}))
                .unwrap();
            let request = HttpRequest::get(url);
            let input = raw_input(&request).unwrap();
            let got = require_str("artifact.getArtifactById", input.as_ref(), "id").unwrap();
            proptest::prop_assert_eq!(got, id.as_str());
        }
    }
}
