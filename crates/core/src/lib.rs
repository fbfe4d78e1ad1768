//! Core types for notesync
//!
//! This crate defines the types shared by every layer of the sync core:
//! - SyncError / SyncResult: the single error taxonomy
//! - Collection: the named collections of the local store and their indices
//! - Row: a stored record (JSON object keyed by `id`)
//! - Entity types: artifacts, versions, snapshots, edges, jobs, users, files
//! - Clock: injectable wall clock
//! - SyncConfig: tunable constants (page size, staleness window, cadences)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod edge;
pub mod entity;
pub mod error;
pub mod row;
pub mod tagged;
pub mod time;

pub use collection::{Collection, IndexDef};
pub use config::{QueueConfig, SyncConfig};
pub use edge::{Edge, EdgeInit};
pub use entity::{
    ArtifactSnapshot, ArtifactSummary, ArtifactVersion, Entity, FileStatus, JobSummary, KnownUser,
    PendingFile,
};
pub use error::{SyncError, SyncResult};
pub use row::Row;
pub use time::{Clock, ManualClock, SystemClock};
