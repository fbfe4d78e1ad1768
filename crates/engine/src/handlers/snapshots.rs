//! `artifact.getArtifactSnapshots`: artifact bodies, gated on freshness.
//!
//! Snapshots are only served offline while the collection's watermark is
//! inside the configured validity window; older copies could silently
//! resurrect stale content.

use notesync_core::{ArtifactSnapshot, Collection, Row, SyncResult};
use serde_json::Value;

use super::{entity_rows, payload, HandlerContext};

/// Every cached snapshot, if the cache is fresh enough.
pub fn offline(ctx: &HandlerContext<'_>) -> SyncResult<Value> {
    ctx.watermarks
        .ensure_fresh(Collection::ArtifactSnapshots, ctx.config.snapshot_validity())?;
    let snapshots = ctx.store.table::<ArtifactSnapshot>().get_all()?;
    payload(&snapshots)
}

/// Rows of a live payload.
pub fn decode(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<ArtifactSnapshot>(data, |s| s)
}
