//! `artifact.getEdgesForArtifactId`: outgoing and incoming references.

use notesync_core::{Edge, Row, SyncResult};
use serde_json::Value;

use super::{entity_rows, payload};
use crate::edge_index::{EdgeIndex, EdgeSet};

/// Edges of `artifact_id` from the edge index (which falls back to the store).
pub fn offline(index: &EdgeIndex, artifact_id: &str) -> SyncResult<Value> {
    payload(&index.get_edges_for_artifact_id(artifact_id))
}

/// Rows of a live payload. Ids are re-derived and empty strings nulled so
/// every edge lands on its canonical key.
pub fn decode(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<Edge>(data, Edge::normalized)
}

/// Split decoded edges into the two directions relative to `artifact_id`.
pub fn split(artifact_id: &str, rows: &[Row]) -> SyncResult<EdgeSet> {
    let mut set = EdgeSet::default();
    for row in rows {
        let edge: Edge = row.to_entity()?;
        if edge.artifact_id == artifact_id {
            set.outgoing.push(edge.clone());
        }
        if edge.target_artifact_id == artifact_id {
            set.incoming.push(edge);
        }
    }
    Ok(set)
}
