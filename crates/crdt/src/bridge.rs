//! Sync bridge between a live record store, its durable replica and a remote
//! session.
//!
//! Lifecycle of one open document:
//!
//! ```text
//! Loading -> SyncingLocal -> AwaitingRemote -> SyncedRemote(Online)
//!                                  |                  ^    |
//!                                  v                  |    v
//!                            ReloadRequired   SyncedRemote(Offline)
//! ```
//!
//! The first successful connection runs the schema handshake; later
//! reconnects only resume pushing. A remote schema with unknown migrations
//! stops the bridge in `ReloadRequired` before anything is merged.
//!
//! Local edits are written to the live store at once and batched twice: a
//! presence broadcast of the touched ids at the fast cadence and a durable
//! flush (replica + store + remote push) at the slow one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notesync_core::{Clock, SyncConfig, SyncError, SyncResult};
use notesync_storage::LocalStore;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::awareness::{new_client_id, Awareness, AwarenessChange, AwarenessUpdate, ClientId, PresenceState};
use crate::crdt::{Crdt, ReplicaId};
use crate::document::{DocumentState, RecordChange, ReplicatedDocument, VersionVector};
use crate::flush::{FlushScheduler, PendingChange};
use crate::live::LiveStore;
use crate::persistence::DocumentStore;
use crate::schema::{MigrationSet, SchemaDescriptor};

/// Whether the remote session is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Pushes are reaching the remote.
    Online,
    /// Disconnected; the local replica stays authoritative.
    Offline,
}

/// Where a bridge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Opening.
    Loading,
    /// Loading the persisted replica into the live store.
    SyncingLocal,
    /// Local replica loaded; no remote handshake yet.
    AwaitingRemote,
    /// Handshake done.
    SyncedRemote(Connectivity),
    /// The remote schema is newer than this client; reload to continue.
    ReloadRequired,
}

/// What the remote answers on first connection.
#[derive(Debug, Clone, Default)]
pub struct RemoteHello {
    /// Remote schema; `None` for a document the remote has never seen.
    pub schema: Option<SchemaDescriptor>,
    /// Encoded remote document state.
    pub state: Vec<u8>,
}

/// A connection to the collaboration server for one document.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Fetch the remote schema and state.
    async fn handshake(&self) -> SyncResult<RemoteHello>;

    /// Send an encoded document update.
    async fn push(&self, update: Vec<u8>) -> SyncResult<()>;

    /// Send a presence delta.
    async fn broadcast(&self, update: AwarenessUpdate) -> SyncResult<()>;
}

/// Bridge cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Presence broadcast granularity.
    pub presence_interval: Duration,
    /// Durable flush granularity.
    pub flush_interval: Duration,
    /// Silence after which a peer is dropped.
    pub awareness_timeout: Duration,
}

impl From<&SyncConfig> for BridgeOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            presence_interval: config.presence_interval(),
            flush_interval: config.flush_interval(),
            awareness_timeout: config.awareness_timeout(),
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Keeps one document in sync.
pub struct SyncBridge {
    name: String,
    doc: Mutex<ReplicatedDocument>,
    live: Arc<LiveStore>,
    scheduler: FlushScheduler,
    awareness: Mutex<Awareness>,
    pending_presence: Mutex<Option<PresenceState>>,
    persistence: DocumentStore,
    migrations: MigrationSet,
    status: watch::Sender<SyncStatus>,
    remote: Mutex<Option<Arc<dyn RemoteSession>>>,
    remote_version: Mutex<VersionVector>,
    has_connected_before: AtomicBool,
    options: BridgeOptions,
}

impl SyncBridge {
    /// Open document `name`, loading its persisted replica into a fresh
    /// live store.
    pub fn open(
        name: impl Into<String>,
        store: &Arc<LocalStore>,
        clock: Arc<dyn Clock>,
        migrations: MigrationSet,
        options: BridgeOptions,
    ) -> SyncResult<Arc<Self>> {
        let name = name.into();
        let (status, _) = watch::channel(SyncStatus::Loading);
        let persistence = DocumentStore::new(store, clock);
        let replica = ReplicaId::new();

        status.send_replace(SyncStatus::SyncingLocal);
        let doc = persistence
            .load(&name, replica)?
            .unwrap_or_else(|| ReplicatedDocument::new(replica));
        let live = Arc::new(LiveStore::new());
        live.load_snapshot(doc.records());
        status.send_replace(SyncStatus::AwaitingRemote);

        tracing::info!(
            target: "notesync::crdt",
            document = %name,
            replica = %replica,
            records = live.len(),
            "Opened replicated document"
        );

        Ok(Arc::new(Self {
            name,
            doc: Mutex::new(doc),
            live,
            scheduler: FlushScheduler::new(),
            awareness: Mutex::new(Awareness::new(new_client_id())),
            pending_presence: Mutex::new(None),
            persistence,
            migrations,
            status,
            remote: Mutex::new(None),
            remote_version: Mutex::new(VersionVector::new()),
            has_connected_before: AtomicBool::new(false),
            options,
        }))
    }

    /// Document name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Status updates.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Whether the handshake has completed once.
    pub fn has_connected_before(&self) -> bool {
        self.has_connected_before.load(Ordering::SeqCst)
    }

    /// The live records.
    pub fn live(&self) -> &Arc<LiveStore> {
        &self.live
    }

    /// This connection's presence id.
    pub fn client_id(&self) -> ClientId {
        self.awareness.lock().client_id()
    }

    /// Live peer states.
    pub fn peers(&self) -> Vec<(ClientId, PresenceState)> {
        self.awareness
            .lock()
            .peers()
            .into_iter()
            .map(|(id, s)| (id, s.clone()))
            .collect()
    }

    /// Copy of the replica's live records.
    pub fn replica_records(&self) -> std::collections::BTreeMap<String, Value> {
        self.doc.lock().records()
    }

    /// Schema of the local replica.
    pub fn schema(&self) -> SchemaDescriptor {
        self.doc.lock().schema()
    }

    fn set_status(&self, next: SyncStatus) {
        let prev = self.status.send_replace(next);
        if prev != next {
            tracing::info!(
                target: "notesync::crdt",
                document = %self.name,
                from = ?prev,
                to = ?next,
                "Sync status changed"
            );
        }
    }

    fn session(&self) -> Option<Arc<dyn RemoteSession>> {
        self.remote.lock().clone()
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Attach a remote session.
    ///
    /// The first call runs the handshake: fail on schema drift, otherwise
    /// migrate the local replica (when it has content) or seed it from the
    /// live store (when it does not), merge the remote state and push what
    /// the remote lacks. Later calls only resume pushing.
    pub async fn connect(&self, remote: Arc<dyn RemoteSession>) -> SyncResult<()> {
        if self.status() == SyncStatus::ReloadRequired {
            return Err(SyncError::schema_drift("document requires a reload"));
        }
        if self.has_connected_before() {
            *self.remote.lock() = Some(remote);
            self.set_status(SyncStatus::SyncedRemote(Connectivity::Online));
            self.flush().await?;
            return Ok(());
        }

        let hello = remote.handshake().await?;
        let remote_schema = hello.schema.clone().unwrap_or_default();
        if let Err(e) = self.migrations.check(&remote_schema) {
            tracing::error!(
                target: "notesync::crdt",
                document = %self.name,
                error = %e,
                "Remote schema is ahead of this client"
            );
            self.set_status(SyncStatus::ReloadRequired);
            return Err(e);
        }
        let remote_state = DocumentState::decode(&hello.state)?;
        let remote_version = remote_state.version_vector();
        let target = match hello.schema {
            Some(schema) => schema,
            None => self.migrations.descriptor(),
        };

        let outgoing = {
            let mut doc = self.doc.lock();
            if doc.is_empty() {
                self.seed(&mut doc, &remote_state, &target);
            } else {
                self.migrate_local(&mut doc, &remote_state, &target)?;
            }
            self.live.load_snapshot(doc.records());
            self.persistence.save(&self.name, &doc)?;
            (doc.diff(&remote_version), doc.version_vector().clone())
        };
        *self.remote_version.lock() = remote_version;
        *self.remote.lock() = Some(Arc::clone(&remote));
        self.has_connected_before.store(true, Ordering::SeqCst);
        self.set_status(SyncStatus::SyncedRemote(Connectivity::Online));

        let (diff, version) = outgoing;
        self.push(&remote, diff, version).await
    }

    /// Empty local replica: take the remote state, then add whatever the
    /// application already put in the live store.
    fn seed(&self, doc: &mut ReplicatedDocument, remote: &DocumentState, target: &SchemaDescriptor) {
        doc.merge(remote);
        let mut seeded = 0usize;
        for (id, value) in self.live.snapshot() {
            if doc.get(&id).is_none() {
                doc.put(id, value);
                seeded += 1;
            }
        }
        if !doc.has_schema() {
            doc.set_schema(target.clone());
        }
        tracing::debug!(
            target: "notesync::crdt",
            document = %self.name,
            seeded,
            "Seeded replica from live store"
        );
    }

    /// Local replica with content: migrate it to `target`, tombstone what
    /// the migrations dropped, then merge the remote state.
    fn migrate_local(
        &self,
        doc: &mut ReplicatedDocument,
        remote: &DocumentState,
        target: &SchemaDescriptor,
    ) -> SyncResult<()> {
        let migrated = self.migrations.migrate(doc.records(), &doc.schema(), target)?;
        for id in &migrated.removed {
            doc.delete(id);
        }
        for (id, value) in &migrated.records {
            if doc.get(id) != Some(value) {
                doc.put(id.clone(), value.clone());
            }
        }
        if !doc.has_schema() || doc.schema() != migrated.schema {
            doc.set_schema(migrated.schema.clone());
        }
        doc.merge(remote);
        tracing::info!(
            target: "notesync::crdt",
            document = %self.name,
            applied = ?migrated.applied,
            removed = migrated.removed.len(),
            "Migrated local replica"
        );
        Ok(())
    }

    /// Detach the remote. Local state is kept.
    pub fn disconnect(&self) {
        self.remote.lock().take();
        if matches!(self.status(), SyncStatus::SyncedRemote(_)) {
            self.set_status(SyncStatus::SyncedRemote(Connectivity::Offline));
        }
    }

    fn went_offline(&self, error: &SyncError) {
        tracing::debug!(
            target: "notesync::crdt",
            document = %self.name,
            error = %error,
            "Remote unreachable"
        );
        if matches!(self.status(), SyncStatus::SyncedRemote(_)) {
            self.set_status(SyncStatus::SyncedRemote(Connectivity::Offline));
        }
    }

    async fn push(
        &self,
        remote: &Arc<dyn RemoteSession>,
        diff: DocumentState,
        version: VersionVector,
    ) -> SyncResult<()> {
        if diff.is_empty() {
            return Ok(());
        }
        match remote.push(diff.encode()?).await {
            Ok(()) => {
                {
                    let mut known = self.remote_version.lock();
                    *known = known.join(&version);
                }
                if self.status() == SyncStatus::SyncedRemote(Connectivity::Offline) {
                    self.set_status(SyncStatus::SyncedRemote(Connectivity::Online));
                }
                Ok(())
            }
            Err(e) if e.is_connectivity() => {
                self.went_offline(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    /// Write record `id` locally.
    pub fn put(&self, id: &str, value: Value) {
        self.live.put(id, value.clone());
        self.scheduler.mark_put(id, value);
    }

    /// Delete record `id` locally. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        let existed = self.live.remove(id);
        if existed {
            self.scheduler.mark_delete(id);
        }
        existed
    }

    /// Replace this connection's presence; sent on the next presence tick.
    pub fn set_presence(&self, state: PresenceState) {
        *self.pending_presence.lock() = Some(state);
    }

    // ========================================================================
    // Remote input
    // ========================================================================

    /// Merge an update pushed by the remote.
    ///
    /// Records with an unflushed local edit keep their live value; the local
    /// edit is stamped later and wins when flushed.
    pub fn apply_remote(&self, update: &[u8]) -> SyncResult<Vec<RecordChange>> {
        let update = DocumentState::decode(update)?;
        if let Some(schema) = &update.schema {
            if let Err(e) = self.migrations.check(&schema.value) {
                self.set_status(SyncStatus::ReloadRequired);
                return Err(e);
            }
        }
        let changes = {
            let mut doc = self.doc.lock();
            let changes = doc.merge(&update);
            self.persistence.save(&self.name, &doc)?;
            changes
        };
        {
            let mut known = self.remote_version.lock();
            *known = known.join(&update.version_vector());
        }
        let visible: Vec<RecordChange> = changes
            .into_iter()
            .filter(|c| !self.scheduler.is_pending(c.id()))
            .collect();
        self.live.apply(&visible);
        Ok(visible)
    }

    /// Merge a presence delta from a peer.
    pub fn apply_presence(&self, update: &AwarenessUpdate) -> AwarenessChange {
        self.awareness.lock().apply_update(update)
    }

    // ========================================================================
    // Cadences
    // ========================================================================

    /// Durable flush: apply the batch to the replica, persist it in one
    /// store write, then push what the remote has not seen.
    ///
    /// Returns the number of records flushed.
    pub async fn flush(&self) -> SyncResult<usize> {
        let batch = self.scheduler.take_batch();
        let flushed = batch.len();
        if !batch.is_empty() {
            let saved = {
                let mut doc = self.doc.lock();
                for (id, change) in &batch.changes {
                    match change {
                        PendingChange::Put(value) => {
                            doc.put(id.clone(), value.clone());
                        }
                        PendingChange::Delete => {
                            doc.delete(id);
                        }
                    }
                }
                self.persistence.save(&self.name, &doc)
            };
            if let Err(e) = saved {
                self.scheduler.restore(batch);
                return Err(e);
            }
            tracing::debug!(
                target: "notesync::crdt",
                document = %self.name,
                records = flushed,
                "Flushed local changes"
            );
        }

        if let Some(remote) = self.session() {
            let since = self.remote_version.lock().clone();
            let (diff, version) = {
                let doc = self.doc.lock();
                (doc.diff(&since), doc.version_vector().clone())
            };
            self.push(&remote, diff, version).await?;
        }
        Ok(flushed)
    }

    /// Presence broadcast of the records touched since the last one.
    ///
    /// Returns whether a delta was produced.
    pub async fn flush_presence(&self) -> SyncResult<bool> {
        let recent = self.scheduler.take_recent();
        let pending = self.pending_presence.lock().take();
        if recent.is_empty() && pending.is_none() {
            return Ok(false);
        }
        let update = {
            let mut awareness = self.awareness.lock();
            let mut state = pending
                .or_else(|| awareness.local_state().cloned())
                .unwrap_or_default();
            state.recent_changes = recent;
            awareness.set_local_state(Some(state))
        };
        self.broadcast(update).await?;
        Ok(true)
    }

    /// Drop silent peers and keep this connection's presence alive.
    pub async fn maintain_presence(&self) -> SyncResult<Vec<ClientId>> {
        let now = Instant::now();
        let (removed, renewal) = {
            let mut awareness = self.awareness.lock();
            let removed = awareness.remove_outdated(now, self.options.awareness_timeout);
            let renewal = awareness.renew_local(now, self.options.awareness_timeout);
            (removed, renewal)
        };
        if !removed.is_empty() {
            tracing::debug!(
                target: "notesync::crdt",
                document = %self.name,
                peers = ?removed,
                "Dropped silent peers"
            );
        }
        if let Some(update) = renewal {
            self.broadcast(update).await?;
        }
        Ok(removed)
    }

    async fn broadcast(&self, update: AwarenessUpdate) -> SyncResult<()> {
        let Some(remote) = self.session() else {
            return Ok(());
        };
        match remote.broadcast(update).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_connectivity() => {
                self.went_offline(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run both cadences on the tokio runtime until the driver is shut down.
    pub fn spawn_driver(self: &Arc<Self>) -> BridgeDriver {
        let bridge = Arc::clone(self);
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let presence_every = bridge.options.presence_interval;
            let flush_every = bridge.options.flush_interval;
            let mut presence = interval_at(start + presence_every, presence_every);
            let mut flush = interval_at(start + flush_every, flush_every);
            presence.set_missed_tick_behavior(MissedTickBehavior::Delay);
            flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = presence.tick() => {
                        if let Err(e) = bridge.flush_presence().await {
                            tracing::warn!(target: "notesync::crdt", document = %bridge.name, error = %e, "Presence broadcast failed");
                        }
                    }
                    _ = flush.tick() => {
                        if let Err(e) = bridge.flush().await {
                            tracing::warn!(target: "notesync::crdt", document = %bridge.name, error = %e, "Flush failed");
                        }
                        if let Err(e) = bridge.maintain_presence().await {
                            tracing::warn!(target: "notesync::crdt", document = %bridge.name, error = %e, "Presence upkeep failed");
                        }
                    }
                }
            }
            bridge.flush().await.map(|_| ())
        });
        BridgeDriver {
            shutdown: Some(shutdown),
            handle,
        }
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("records", &self.live.len())
            .field("pending", &self.scheduler.pending())
            .finish()
    }
}

/// Handle to a running bridge driver.
#[derive(Debug)]
pub struct BridgeDriver {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<SyncResult<()>>,
}

impl BridgeDriver {
    /// Stop the cadences and flush immediately.
    pub async fn shutdown(mut self) -> SyncResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle
            .await
            .map_err(|e| SyncError::internal(format!("bridge driver panicked: {e}")))?
    }
}
