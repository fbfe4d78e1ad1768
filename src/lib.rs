//! notesync: the offline-first synchronization core of a collaborative
//! note-taking client.
//!
//! This crate re-exports the public surface of the member crates:
//! - `OfflineClient` answers data fetches from the network or, when the
//!   network is down, from the local store, and queues writes for replay
//! - `SyncBridge` keeps a collaborative document in sync with its replicas
//!
//! ```no_run
//! use std::sync::Arc;
//! use notesync::{HttpRequest, MockTransport, OfflineClient, SyncConfig};
//!
//! # async fn demo() -> notesync::SyncResult<()> {
//! let client = OfflineClient::open(SyncConfig::default(), Arc::new(MockTransport::new()))?;
//! let response = client.fetch(HttpRequest::get("/api/job.getJobs")).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ============================================================================
// Core types
// ============================================================================

pub use notesync_core::{
    ArtifactSnapshot, ArtifactSummary, ArtifactVersion, Clock, Collection, Edge, EdgeInit, Entity,
    FileStatus, JobSummary, KnownUser, ManualClock, PendingFile, QueueConfig, Row, SyncConfig,
    SyncError, SyncResult, SystemClock,
};

// ============================================================================
// Wire format
// ============================================================================

pub use notesync_wire::{HttpRequest, HttpResponse, Method, Procedure, ProcedureInput, Strategy};
pub use notesync_wire::{envelope, input, transformer};

// ============================================================================
// Local store
// ============================================================================

pub use notesync_storage::{ChangeEvent, LocalStore, Subscription, Table};

// ============================================================================
// Offline cache engine
// ============================================================================

pub use notesync_engine::{
    EdgeIndex, EdgeListener, EdgeSet, MockTransport, OfflineClient, Outcome, PendingWrite,
    ReplayReport, RetryPolicy, SearchHit, SearchProvider, Transport, WriteQueue, QUEUED_STATUS,
};

// ============================================================================
// Replicated documents
// ============================================================================

pub use notesync_crdt::{
    AwarenessUpdate, BridgeDriver, BridgeOptions, Connectivity, DocumentState, MigrationSet,
    PresenceState, RemoteHello, RemoteSession, ReplicaId, ReplicatedDocument, SchemaDescriptor,
    SyncBridge, SyncStatus,
};
