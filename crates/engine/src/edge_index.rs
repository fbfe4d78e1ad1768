//! In-memory edge index for synchronous lookups.
//!
//! The index is a materialized view of the `edges` collection keyed by
//! artifact: for each warm artifact it holds the outgoing edges (where the
//! artifact is the source) and the incoming edges (where it is the target).
//! Editors read it synchronously while rendering; it is refreshed from the
//! local store and never authoritative.
//!
//! Entries become warm when someone listens for an artifact and are evicted
//! when the last listener goes away. Entries filled through
//! [`EdgeIndex::provide_static_edges_for_artifact_id`] are pinned: they stay
//! until invalidated or cleared, whatever their listeners do. Every commit to
//! the `edges` collection refreshes the entries it touches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use notesync_core::{Collection, Edge, Row};
use notesync_storage::{ChangeEvent, LocalStore, Subscription};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

/// Edges touching one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSet {
    /// Edges whose source is the artifact.
    pub outgoing: Vec<Edge>,
    /// Edges whose target is the artifact.
    pub incoming: Vec<Edge>,
}

impl EdgeSet {
    /// Outgoing then incoming, each edge once (self-references appear in both
    /// lists).
    pub fn all(&self) -> Vec<Edge> {
        let mut seen = FxHashSet::default();
        self.outgoing
            .iter()
            .chain(self.incoming.iter())
            .filter(|e| seen.insert(e.id.as_str()))
            .cloned()
            .collect()
    }

    fn contains(&self, edge_id: &str) -> bool {
        self.outgoing
            .iter()
            .chain(self.incoming.iter())
            .any(|e| e.id == edge_id)
    }
}

type Listener = Arc<dyn Fn(&EdgeSet) + Send + Sync>;

struct Entry {
    edges: EdgeSet,
    listeners: Vec<(u64, Listener)>,
    /// Provided rather than loaded; survives losing its last listener.
    pinned: bool,
}

impl Entry {
    fn evictable(&self) -> bool {
        self.listeners.is_empty() && !self.pinned
    }
}

/// Artifact-keyed cache of edges.
pub struct EdgeIndex {
    store: Arc<LocalStore>,
    entries: RwLock<FxHashMap<String, Entry>>,
    next_listener: AtomicU64,
    _changes: Subscription,
}

impl EdgeIndex {
    /// Create an index over `store`'s edges collection.
    pub fn new(store: Arc<LocalStore>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<EdgeIndex>| {
            let weak = weak.clone();
            let changes = store.subscribe(Collection::Edges, move |event| {
                if let Some(index) = weak.upgrade() {
                    index.on_store_change(event);
                }
            });
            EdgeIndex {
                store,
                entries: RwLock::new(FxHashMap::default()),
                next_listener: AtomicU64::new(0),
                _changes: changes,
            }
        })
    }

    /// Seed the entry for `artifact_id` with edges obtained elsewhere (a
    /// network response, a shared view). Listeners are notified.
    pub fn provide_static_edges_for_artifact_id(
        &self,
        artifact_id: &str,
        outgoing: Vec<Edge>,
        incoming: Vec<Edge>,
    ) {
        let edges = EdgeSet { outgoing, incoming };
        let listeners = {
            let mut entries = self.entries.write();
            let entry = entries
                .entry(artifact_id.to_string())
                .or_insert_with(|| Entry {
                    edges: EdgeSet::default(),
                    listeners: Vec::new(),
                    pinned: true,
                });
            entry.edges = edges.clone();
            entry.pinned = true;
            listener_list(entry)
        };
        notify(&listeners, &edges);
    }

    /// Keep `artifact_id` warm and call `callback` whenever its edges are
    /// refreshed. The entry is loaded from the store on first listen.
    /// Dropping the returned guard removes the listener.
    pub fn listen_for_artifact_id<F>(self: &Arc<Self>, artifact_id: &str, callback: F) -> EdgeListener
    where
        F: Fn(&EdgeSet) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let needs_load = !self.entries.read().contains_key(artifact_id);
        let loaded = needs_load.then(|| self.load(artifact_id));

        let mut entries = self.entries.write();
        let entry = entries
            .entry(artifact_id.to_string())
            .or_insert_with(|| Entry {
                edges: loaded.unwrap_or_default(),
                listeners: Vec::new(),
                pinned: false,
            });
        entry.listeners.push((id, Arc::new(callback)));
        drop(entries);

        EdgeListener {
            id,
            artifact_id: artifact_id.to_string(),
            index: Arc::downgrade(self),
        }
    }

    /// Outgoing then incoming edges of `artifact_id`.
    ///
    /// Served from the warm entry when there is one, otherwise read straight
    /// from the store without warming.
    pub fn get_edges_for_artifact_id(&self, artifact_id: &str) -> Vec<Edge> {
        self.edge_set(artifact_id).all()
    }

    /// Incoming edges of `artifact_id` that point at `block_id`.
    pub fn get_incoming_edges_for_block(&self, artifact_id: &str, block_id: &str) -> Vec<Edge> {
        self.edge_set(artifact_id)
            .incoming
            .into_iter()
            .filter(|e| e.targets_block(block_id))
            .collect()
    }

    /// Drop cached edges for `artifact_id`, pinned or not. A warm entry is
    /// reloaded from the store and its listeners notified; a cold one is
    /// evicted.
    pub fn invalidate(&self, artifact_id: &str) {
        let has_listeners = self
            .entries
            .read()
            .get(artifact_id)
            .map(|e| !e.listeners.is_empty());
        match has_listeners {
            Some(true) => {
                self.unpin(artifact_id);
                self.refresh(artifact_id);
            }
            Some(false) => {
                self.entries.write().remove(artifact_id);
            }
            None => {}
        }
    }

    /// Forget every cached entry (session change). Warm entries are reloaded
    /// so their listeners see the new store contents.
    pub fn clear(&self) {
        let warm: Vec<String> = {
            let mut entries = self.entries.write();
            entries.retain(|_, e| !e.listeners.is_empty());
            for entry in entries.values_mut() {
                entry.pinned = false;
            }
            entries.keys().cloned().collect()
        };
        for artifact_id in warm {
            self.refresh(&artifact_id);
        }
    }

    /// Whether `artifact_id` has a cached entry.
    pub fn is_cached(&self, artifact_id: &str) -> bool {
        self.entries.read().contains_key(artifact_id)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn edge_set(&self, artifact_id: &str) -> EdgeSet {
        if let Some(entry) = self.entries.read().get(artifact_id) {
            return entry.edges.clone();
        }
        self.load(artifact_id)
    }

    /// Read both directions from the store. Undecodable rows are skipped.
    fn load(&self, artifact_id: &str) -> EdgeSet {
        EdgeSet {
            outgoing: self.load_direction("artifactId", artifact_id),
            incoming: self.load_direction("targetArtifactId", artifact_id),
        }
    }

    fn load_direction(&self, index: &str, artifact_id: &str) -> Vec<Edge> {
        let rows = match self
            .store
            .get_all_from_index(Collection::Edges, index, artifact_id)
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    target: "notesync::edges",
                    artifact_id,
                    index,
                    error = %e,
                    "Failed to read edges from store"
                );
                return Vec::new();
            }
        };
        rows.into_iter().filter_map(decode_edge).collect()
    }

    fn refresh(&self, artifact_id: &str) {
        let edges = self.load(artifact_id);
        let listeners = {
            let mut entries = self.entries.write();
            match entries.get_mut(artifact_id) {
                Some(entry) => {
                    entry.edges = edges.clone();
                    listener_list(entry)
                }
                None => return,
            }
        };
        notify(&listeners, &edges);
    }

    fn remove_listener(&self, artifact_id: &str, id: u64) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(artifact_id) {
            entry.listeners.retain(|(lid, _)| *lid != id);
            if entry.evictable() {
                entries.remove(artifact_id);
            }
        }
    }

    fn unpin(&self, artifact_id: &str) {
        if let Some(entry) = self.entries.write().get_mut(artifact_id) {
            entry.pinned = false;
        }
    }

    /// Refresh every cached entry a commit may have changed.
    fn on_store_change(&self, event: &ChangeEvent) {
        let affected: Vec<String> = {
            let entries = self.entries.read();
            if entries.is_empty() {
                return;
            }
            if event.cleared {
                entries.keys().cloned().collect()
            } else {
                let mut affected = FxHashSet::default();
                for edge_id in &event.touched {
                    // current row covers puts; cached sets cover deletes
                    if let Some(row) = self.store.get(Collection::Edges, edge_id) {
                        for field in ["artifactId", "targetArtifactId"] {
                            if let Some(artifact) = row.str_field(field) {
                                if entries.contains_key(artifact) {
                                    affected.insert(artifact.to_string());
                                }
                            }
                        }
                    }
                    for (artifact, entry) in entries.iter() {
                        if entry.edges.contains(edge_id) {
                            affected.insert(artifact.clone());
                        }
                    }
                }
                affected.into_iter().collect()
            }
        };
        for artifact_id in affected {
            self.refresh(&artifact_id);
        }
    }
}

impl std::fmt::Debug for EdgeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeIndex")
            .field("entries", &self.len())
            .finish()
    }
}

fn decode_edge(row: Row) -> Option<Edge> {
    let id = row.id().to_string();
    match row.into_entity::<Edge>() {
        Ok(edge) => Some(edge),
        Err(e) => {
            tracing::warn!(target: "notesync::edges", edge_id = %id, error = %e, "Skipping undecodable edge row");
            None
        }
    }
}

fn listener_list(entry: &Entry) -> Vec<Listener> {
    entry.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
}

fn notify(listeners: &[Listener], edges: &EdgeSet) {
    for listener in listeners {
        listener(edges);
    }
}

/// Guard returned by [`EdgeIndex::listen_for_artifact_id`]; dropping it
/// stops the callback and may evict the entry.
#[must_use = "dropping an EdgeListener unsubscribes immediately"]
pub struct EdgeListener {
    id: u64,
    artifact_id: String,
    index: Weak<EdgeIndex>,
}

impl EdgeListener {
    /// Artifact being listened to.
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Stop listening.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        if let Some(index) = self.index.upgrade() {
            index.remove_listener(&self.artifact_id, self.id);
        }
    }
}
