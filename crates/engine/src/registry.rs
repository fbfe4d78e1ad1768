//! Route registry: the interception layer.
//!
//! Every outgoing request is matched against the [`Procedure`] table.
//! Unmatched requests go to the network untouched. Matched requests follow
//! their [`Strategy`]:
//!
//! | Strategy | Online (2xx) | Network failure |
//! |----------|--------------|-----------------|
//! | List | replace cached list, return response | all matching cached rows |
//! | Single | upsert row, return response | cached row, else the network error |
//! | Mutation | return response | queue for replay (optimistic row for uploads) |
//! | Passthrough | provider / network answer | store-backed fallback |
//!
//! Non-2xx responses are returned as-is and never cached.

use std::sync::Arc;

use notesync_core::{FileStatus, SyncConfig, SyncError, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::{envelope, transformer, HttpRequest, HttpResponse, Procedure, ProcedureInput, Strategy};

use crate::edge_index::EdgeIndex;
use crate::handlers::search::{SearchProvider, DEFAULT_SEARCH_LIMIT};
use crate::handlers::{self, files, HandlerContext};
use crate::queue::{PendingWrite, WriteQueue};
use crate::reconciler::Reconciler;
use crate::transport::Transport;
use crate::watermark::Watermarks;

/// Status of the response synthesized for a queued mutation.
pub const QUEUED_STATUS: u16 = 202;

/// How a request was answered.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The server's response, verbatim.
    Network(HttpResponse),
    /// Synthesized from the local store.
    Cached(HttpResponse),
    /// Mutation queued for replay; the response acknowledges the queueing.
    Queued {
        /// The queued item.
        write: Box<PendingWrite>,
        /// Synthesized acknowledgement.
        response: HttpResponse,
    },
}

impl Outcome {
    /// The response handed back to the caller.
    pub fn response(&self) -> &HttpResponse {
        match self {
            Outcome::Network(r) | Outcome::Cached(r) => r,
            Outcome::Queued { response, .. } => response,
        }
    }

    /// Consume into the response.
    pub fn into_response(self) -> HttpResponse {
        match self {
            Outcome::Network(r) | Outcome::Cached(r) => r,
            Outcome::Queued { response, .. } => response,
        }
    }

    /// Whether the answer came from the network.
    pub fn is_network(&self) -> bool {
        matches!(self, Outcome::Network(_))
    }
}

/// Dispatches intercepted requests.
pub struct RouteRegistry {
    config: Arc<SyncConfig>,
    store: Arc<LocalStore>,
    edges: Arc<EdgeIndex>,
    watermarks: Watermarks,
    reconciler: Reconciler,
    queue: Arc<WriteQueue>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl RouteRegistry {
    /// Assemble a registry from its collaborators.
    pub fn new(
        config: Arc<SyncConfig>,
        store: Arc<LocalStore>,
        edges: Arc<EdgeIndex>,
        watermarks: Watermarks,
        queue: Arc<WriteQueue>,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&edges), watermarks.clone());
        Self {
            config,
            store,
            edges,
            watermarks,
            reconciler,
            queue,
            search: None,
        }
    }

    /// Use `provider` for `search.searchArtifacts`.
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Procedure a request would be routed to, if any.
    pub fn match_request(&self, request: &HttpRequest) -> Option<Procedure> {
        Procedure::match_request(request, &self.config)
    }

    /// Route one request.
    pub async fn handle(&self, request: HttpRequest, transport: &dyn Transport) -> SyncResult<Outcome> {
        let Some(procedure) = self.match_request(&request) else {
            return transport.send(request).await.map(Outcome::Network);
        };
        let input = procedure.parse_input(&request)?;

        match procedure.strategy() {
            Strategy::List | Strategy::Single => {
                self.handle_read(procedure, &input, request, transport).await
            }
            Strategy::Mutation => self.handle_mutation(procedure, &input, request, transport).await,
            Strategy::Passthrough => self.handle_search(procedure, &input, request, transport).await,
        }
    }

    async fn handle_read(
        &self,
        procedure: Procedure,
        input: &ProcedureInput,
        request: HttpRequest,
        transport: &dyn Transport,
    ) -> SyncResult<Outcome> {
        match transport.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    match procedure.strategy() {
                        Strategy::Single => self.reconciler.apply_single(procedure, &response.body),
                        _ => {
                            self.reconciler.apply_list(procedure, input, &response.body)?;
                        }
                    }
                }
                Ok(Outcome::Network(response))
            }
            Err(e) if e.is_connectivity() => self.fallback(procedure, input, e),
            Err(e) => Err(e),
        }
    }

    /// Serve from the store; a cache miss surfaces `network_error`.
    fn fallback(
        &self,
        procedure: Procedure,
        input: &ProcedureInput,
        network_error: SyncError,
    ) -> SyncResult<Outcome> {
        let ctx = HandlerContext {
            store: &self.store,
            edges: &self.edges,
            watermarks: &self.watermarks,
            config: &self.config,
        };
        match handlers::offline(&ctx, procedure, input) {
            Ok(data) => {
                tracing::debug!(
                    target: "notesync::registry",
                    procedure = %procedure,
                    "Served from local store"
                );
                envelope::cached_response(data).map(Outcome::Cached)
            }
            Err(miss) if miss.is_cache_miss() => {
                tracing::debug!(
                    target: "notesync::registry",
                    procedure = %procedure,
                    reason = %miss,
                    "Cache miss while offline"
                );
                Err(network_error)
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_mutation(
        &self,
        procedure: Procedure,
        input: &ProcedureInput,
        request: HttpRequest,
        transport: &dyn Transport,
    ) -> SyncResult<Outcome> {
        match transport.send(request.clone()).await {
            Ok(response) => {
                if response.is_success() {
                    if let ProcedureInput::UploadFile(upload) = input {
                        files::record(&self.store, upload, FileStatus::Confirmed, self.watermarks.now())?;
                    }
                }
                Ok(Outcome::Network(response))
            }
            Err(e) if e.is_connectivity() => {
                if let ProcedureInput::UploadFile(upload) = input {
                    files::record(&self.store, upload, FileStatus::Staged, self.watermarks.now())?;
                }
                let entity_id = input.entity_id().map(String::from);
                let write = self.queue.enqueue(request, procedure, entity_id)?;
                let ack = serde_json::json!({
                    "queued": true,
                    "sequence": write.sequence,
                    "id": write.entity_id,
                });
                let response = envelope::cached_response(ack)?;
                let response = HttpResponse {
                    status: QUEUED_STATUS,
                    ..response
                };
                Ok(Outcome::Queued {
                    write: Box::new(write),
                    response,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_search(
        &self,
        procedure: Procedure,
        input: &ProcedureInput,
        request: HttpRequest,
        transport: &dyn Transport,
    ) -> SyncResult<Outcome> {
        let live = match (&self.search, input) {
            (Some(provider), ProcedureInput::Search(query)) => {
                let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
                match provider.search(&query.query, limit).await {
                    Ok(hits) => {
                        let data = transformer::serialize(&hits)?;
                        envelope::live_response(data).map(Outcome::Network)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => transport.send(request).await.map(Outcome::Network),
        };
        match live {
            Err(e) if e.is_connectivity() => self.fallback(procedure, input, e),
            other => other,
        }
    }
}
