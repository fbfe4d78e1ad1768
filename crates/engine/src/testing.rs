//! In-memory transport for tests and demos.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use notesync_core::{SyncError, SyncResult};
use notesync_wire::{envelope, input, HttpRequest, HttpResponse};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

#[derive(Debug, Clone)]
enum Reply {
    Data(Value),
    Status(u16),
}

/// A [`Transport`](crate::Transport) answering from canned replies.
///
/// Replies are keyed by the last path segment of the URL (the dotted
/// procedure name). Unknown procedures answer 404. While offline every send
/// fails with `SyncError::Network`. Every request that reached the "server"
/// is recorded.
#[derive(Debug)]
pub struct MockTransport {
    online: AtomicBool,
    replies: Mutex<FxHashMap<String, Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// An online transport with no replies.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            replies: Mutex::new(FxHashMap::default()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Toggle connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether sends currently succeed.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Answer `procedure` with `data` inside the success envelope.
    pub fn respond(&self, procedure: &str, data: Value) {
        self.replies
            .lock()
            .insert(procedure.to_string(), Reply::Data(data));
    }

    /// Answer `procedure` with an empty body and `status`.
    pub fn respond_status(&self, procedure: &str, status: u16) {
        self.replies
            .lock()
            .insert(procedure.to_string(), Reply::Status(status));
    }

    /// Requests that reached the server, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// How many requests for `procedure` reached the server.
    pub fn sent_to(&self, procedure: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| procedure_of(&r.url).as_deref() == Some(procedure))
            .count()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn procedure_of(url: &str) -> Option<String> {
    let parsed = input::parse_url(url).ok()?;
    parsed
        .path_segments()?
        .last()
        .map(|s| s.to_string())
}

#[async_trait]
impl crate::Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if !self.is_online() {
            return Err(SyncError::network("offline"));
        }
        let name = procedure_of(&request.url).unwrap_or_default();
        self.requests.lock().push(request);
        let reply = self.replies.lock().get(&name).cloned();
        match reply {
            Some(Reply::Data(data)) => envelope::live_response(data),
            Some(Reply::Status(status)) => Ok(HttpResponse::new(status, Vec::new())),
            None => Ok(HttpResponse::new(404, Vec::new())),
        }
    }
}
