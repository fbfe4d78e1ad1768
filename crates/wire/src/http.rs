//! HTTP request/response values.
//!
//! The sync core never talks to a socket itself; it sees requests and
//! responses as plain values so they can be matched, cloned, persisted in the
//! write queue and replayed later.

use std::collections::BTreeMap;
use std::fmt;

use notesync_core::{tagged, SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header map with lowercase names.
pub type Headers = BTreeMap<String, String>;

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL or same-origin path, including the query string.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: Headers,
    /// Request body; empty when there is none.
    #[serde(with = "tagged::bytes", default)]
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// A request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// GET `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// POST `url` with a JSON body.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> SyncResult<Self> {
        Ok(Self::new(Method::Post, url)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_vec(body)?))
    }

    /// Add a header (name is lowercased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body parsed as JSON; `None` when the body is empty.
    pub fn json_body(&self) -> SyncResult<Option<serde_json::Value>> {
        if self.body.is_empty() {
            return Ok(None);
        }
        crate::transformer::from_bytes(&self.body)
            .map(Some)
            .map_err(|e| SyncError::invalid_input(format!("request body is not JSON: {e}")))
    }
}

/// A received (or synthesized) response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with `status` and `body`.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body,
        }
    }

    /// A 200 response with a JSON body.
    pub fn json(value: &serde_json::Value) -> SyncResult<Self> {
        Ok(Self::new(200, serde_json::to_vec(value)?)
            .with_header("content-type", "application/json"))
    }

    /// Add a header (name is lowercased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into `HttpStatus`.
    pub fn error_for_status(self) -> SyncResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::HttpStatus {
                status: self.status,
            })
        }
    }
}
