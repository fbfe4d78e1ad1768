//! Offline cache engine for notesync
//!
//! This crate decides, per request, whether the answer comes from the
//! network or from the local store, and keeps the two in step:
//! - RouteRegistry: matches procedures and applies their caching strategy
//! - handlers: per-resource offline answers and payload decoding
//! - Reconciler: writes live responses into the store
//! - EdgeIndex: in-memory, store-backed cache of artifact references
//! - WriteQueue: durable FIFO of mutations captured while offline
//! - Watermarks: last-refresh times used for staleness gating
//! - OfflineClient: the facade applications talk to

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod edge_index;
pub mod handlers;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod testing;
pub mod transport;
pub mod watermark;

pub use client::OfflineClient;
pub use edge_index::{EdgeIndex, EdgeListener, EdgeSet};
pub use handlers::search::{SearchHit, SearchProvider};
pub use queue::{PendingWrite, ReplayReport, RetryPolicy, WriteQueue};
pub use reconciler::{ListScope, Reconciler};
pub use registry::{Outcome, RouteRegistry, QUEUED_STATUS};
pub use testing::MockTransport;
pub use transport::Transport;
pub use watermark::{watermark_key, Watermarks};
