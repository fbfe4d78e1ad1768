//! Offline Sync Test Suite
//!
//! End-to-end checks of the sync core through the public `notesync` API.
//!
//! ## Areas
//!
//! - **Jobs offline**: filtered, sorted, paginated listing from the cache
//! - **Fallback equivalence**: cached answers match the last live answer
//! - **Watermark gating**: stale snapshots are never served silently
//! - **Queue replay**: offline writes replay once, in order, across restarts
//! - **Idempotent refresh**: repeated refreshes leave the same store
//! - **Document convergence**: replicas agree after exchanging updates
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test offline_sync
//! ```

// Test modules
mod test_utils;

mod document_convergence;
mod fallback_equivalence;
mod idempotent_refresh;
mod jobs_offline;
mod queue_replay;
mod watermark_gating;
