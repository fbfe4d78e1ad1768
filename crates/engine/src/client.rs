//! The application-facing entry point.
//!
//! `OfflineClient` owns the store, edge index, write queue and registry, and
//! exposes a `fetch` that behaves like the network when the network is up
//! and like the cache when it is not.

use std::sync::Arc;

use notesync_core::{Clock, Collection, SyncConfig, SyncResult, SystemClock};
use notesync_storage::LocalStore;
use notesync_wire::{HttpRequest, HttpResponse};

use crate::edge_index::EdgeIndex;
use crate::handlers::search::SearchProvider;
use crate::queue::{ReplayReport, RetryPolicy, WriteQueue};
use crate::registry::{Outcome, RouteRegistry};
use crate::transport::Transport;
use crate::watermark::Watermarks;

/// Collections mirrored from the server; cleared when the session changes.
const MIRRORED: [Collection; 7] = [
    Collection::Artifacts,
    Collection::ArtifactVersions,
    Collection::ArtifactSnapshots,
    Collection::Edges,
    Collection::Jobs,
    Collection::KnownUsers,
    Collection::PendingFiles,
];

/// Replicas of the signed-in user's collaborative documents; cleared with
/// the mirror but carry no watermark.
const USER_DOCUMENTS: Collection = Collection::Documents;

/// Offline-first client over a [`Transport`].
pub struct OfflineClient {
    config: Arc<SyncConfig>,
    store: Arc<LocalStore>,
    edges: Arc<EdgeIndex>,
    watermarks: Watermarks,
    queue: Arc<WriteQueue>,
    registry: RouteRegistry,
    transport: Arc<dyn Transport>,
}

impl OfflineClient {
    /// Open the store named by `config.data_dir` (in memory when unset).
    pub fn open(config: SyncConfig, transport: Arc<dyn Transport>) -> SyncResult<Self> {
        config.validate()?;
        let store = match &config.data_dir {
            Some(dir) => LocalStore::open_compacting(dir, true, config.compact_after_records)?,
            None => LocalStore::ephemeral(),
        };
        Self::with_store(config, store, transport, Arc::new(SystemClock))
    }

    /// Build a client over an existing store and clock.
    pub fn with_store(
        config: SyncConfig,
        store: Arc<LocalStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let config = Arc::new(config);
        store.set_compact_after(config.compact_after_records);
        let edges = EdgeIndex::new(Arc::clone(&store));
        let watermarks = Watermarks::new(Arc::clone(&store), Arc::clone(&clock));
        let queue = Arc::new(WriteQueue::new(
            Arc::clone(&store),
            clock,
            RetryPolicy::from(&config.queue),
        )?);
        let registry = RouteRegistry::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&edges),
            watermarks.clone(),
            Arc::clone(&queue),
        );

        tracing::info!(
            target: "notesync::client",
            persistent = store.is_persistent(),
            pending = queue.len(),
            "Offline client ready"
        );

        Ok(Self {
            config,
            store,
            edges,
            watermarks,
            queue,
            registry,
            transport,
        })
    }

    /// Route `search.searchArtifacts` through `provider`.
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.registry = self.registry.with_search(provider);
        self
    }

    /// Send `request`, falling back to the store when the network is down.
    pub async fn fetch(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        self.route(request).await.map(Outcome::into_response)
    }

    /// Like [`fetch`](Self::fetch), but reports how the request was answered.
    pub async fn route(&self, request: HttpRequest) -> SyncResult<Outcome> {
        self.registry.handle(request, self.transport.as_ref()).await
    }

    /// Replay queued mutations in order.
    pub async fn replay_pending(&self) -> SyncResult<ReplayReport> {
        self.queue.replay(self.transport.as_ref()).await
    }

    /// Drop everything mirrored for the previous user.
    ///
    /// Persisted document replicas go too: they hold the previous user's
    /// content and are rebuilt from the server on the next handshake. Shut
    /// down open sync bridges first, or their next flush writes the old
    /// replica back.
    ///
    /// Pending writes survive: they were made by a user of this device and
    /// are replayed under whatever credentials the transport carries next.
    pub fn on_session_change(&self) -> SyncResult<()> {
        for collection in MIRRORED {
            self.store.clear(collection)?;
            self.watermarks.reset(collection)?;
        }
        self.store.clear(USER_DOCUMENTS)?;
        self.edges.clear();
        tracing::info!(target: "notesync::client", "Cleared mirrored data for new session");
        Ok(())
    }

    /// The local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The edge cache.
    pub fn edges(&self) -> &Arc<EdgeIndex> {
        &self.edges
    }

    /// The write queue.
    pub fn queue(&self) -> &Arc<WriteQueue> {
        &self.queue
    }

    /// Sync watermarks.
    pub fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    /// Effective configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl std::fmt::Debug for OfflineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineClient")
            .field("store", &self.store)
            .field("pending", &self.queue.len())
            .field("api_base_url", &self.config.api_base_url)
            .finish()
    }
}
