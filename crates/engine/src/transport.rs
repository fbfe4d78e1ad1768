//! Network seam.

use async_trait::async_trait;
use notesync_core::SyncResult;
use notesync_wire::{HttpRequest, HttpResponse};

/// Sends requests to the server.
///
/// Implementations return `Err(SyncError::Network { .. })` when the request
/// never produced a response (offline, DNS, connection reset). A response with
/// any status, including 4xx/5xx, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}
