//! Replicated documents for notesync
//!
//! This crate keeps collaborative documents in sync across replicas:
//! - Crdt / Lww / Stamp: merge primitives
//! - ReplicatedDocument: record map with tombstones, version vector, deltas
//! - MigrationSet: schema descriptor comparison and forward migrations
//! - Awareness: per-connection presence with add/update/remove deltas
//! - FlushScheduler: dirty-set batching for the two sync cadences
//! - DocumentStore: replicas persisted in the local store
//! - SyncBridge: the per-document state machine tying it together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod awareness;
pub mod bridge;
pub mod crdt;
pub mod document;
pub mod flush;
pub mod live;
pub mod persistence;
pub mod schema;

pub use awareness::{
    new_client_id, Awareness, AwarenessChange, AwarenessEntry, AwarenessUpdate, ClientId,
    PresenceState,
};
pub use bridge::{
    BridgeDriver, BridgeOptions, Connectivity, RemoteHello, RemoteSession, SyncBridge, SyncStatus,
};
pub use crdt::{Crdt, Lww, ReplicaId, Stamp};
pub use document::{
    DocumentState, RecordChange, ReplicatedDocument, VersionVector, RECORDS_KEY, SCHEMA_KEY,
};
pub use flush::{FlushBatch, FlushScheduler, PendingChange};
pub use live::LiveStore;
pub use persistence::{DocumentStore, StoredDocument};
pub use schema::{MigrateFn, Migrated, MigrationSet, SchemaDescriptor, SchemaOrder};
