//! Change notifications.
//!
//! Consumers that mirror store contents (the edge index, the write queue's
//! length display) register a callback per collection and are told about
//! every committed transaction on it. Callbacks run on the committing thread
//! after every store lock has been released, so they may read the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use notesync_core::Collection;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// What one committed transaction did to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Collection the transaction wrote to.
    pub collection: Collection,
    /// Store version after the commit.
    pub version: u64,
    /// Ids put or deleted, deduplicated, in first-touch order.
    pub touched: Vec<String>,
    /// Whether the collection was cleared.
    pub cleared: bool,
}

impl ChangeEvent {
    /// Whether `id` may have changed.
    pub fn affects(&self, id: &str) -> bool {
        self.cleared || self.touched.iter().any(|t| t == id)
    }
}

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Callback registry shared by the store and its subscriptions.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    entries: RwLock<FxHashMap<Collection, Vec<(u64, Callback)>>>,
}

impl Subscribers {
    pub(crate) fn add(
        self: &Arc<Self>,
        collection: Collection,
        callback: Callback,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .entry(collection)
            .or_default()
            .push((id, callback));
        Subscription {
            id,
            collection,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, collection: Collection, id: u64) {
        let mut entries = self.entries.write();
        if let Some(list) = entries.get_mut(&collection) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                entries.remove(&collection);
            }
        }
    }

    pub(crate) fn count(&self, collection: Collection) -> usize {
        self.entries
            .read()
            .get(&collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver `event` to every subscriber of its collection.
    ///
    /// The callback list is snapshotted first so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub(crate) fn notify(&self, event: &ChangeEvent) {
        let callbacks: Vec<Callback> = match self.entries.read().get(&event.collection) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(event);
        }
    }
}

/// Handle on a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    collection: Collection,
    registry: Weak<Subscribers>,
}

impl Subscription {
    /// Collection this subscription watches.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.collection, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .finish()
    }
}
