//! Edges: directed references between artifacts.
//!
//! An edge optionally points from a block inside the source artifact and at a
//! block or date inside the target artifact. Its `id` is derived purely from
//! the five identifying fields so the same logical reference maps to the same
//! row no matter which side produced it, making upserts idempotent.
//!
//! Nullable fields are stored as `null`, never `""`: the store rejects empty
//! strings in indexed fields, and `""` and `null` must not produce distinct
//! ids for the same reference.

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::entity::Entity;

/// Separator between identifying segments of an edge id.
const SEP: char = ':';

/// Placeholder for an absent segment. Cannot collide with an encoded value,
/// since `encode_segment` escapes `~`.
const NONE_SEGMENT: &str = "~";

/// Escape a segment so separators inside ids cannot create ambiguity.
fn encode_segment(value: Option<&str>) -> String {
    match value {
        None => NONE_SEGMENT.to_string(),
        Some(v) => v
            .replace('%', "%25")
            .replace(SEP, "%3A")
            .replace('~', "%7E"),
    }
}

/// Coerce `""` to `None`.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Deterministic id for the identifying tuple.
pub fn edge_id(
    artifact_id: &str,
    artifact_block_id: Option<&str>,
    target_artifact_id: &str,
    target_artifact_block_id: Option<&str>,
    target_artifact_date: Option<&str>,
) -> String {
    let segments = [
        encode_segment(Some(artifact_id)),
        encode_segment(artifact_block_id.filter(|v| !v.is_empty())),
        encode_segment(Some(target_artifact_id)),
        encode_segment(target_artifact_block_id.filter(|v| !v.is_empty())),
        encode_segment(target_artifact_date.filter(|v| !v.is_empty())),
    ];
    segments.join(&SEP.to_string())
}

/// A directed reference between two artifacts, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Derived from the identifying tuple.
    pub id: String,
    /// Source artifact.
    pub artifact_id: String,
    /// Source block, if the reference sits inside a block.
    pub artifact_block_id: Option<String>,
    /// Target artifact.
    pub target_artifact_id: String,
    /// Target block, if the reference points at a block.
    pub target_artifact_block_id: Option<String>,
    /// Target date (calendar artifacts), if any.
    pub target_artifact_date: Option<String>,
    /// True when the target could not be resolved.
    #[serde(default)]
    pub is_broken: bool,
    /// Denormalized source title.
    #[serde(default)]
    pub artifact_title: String,
    /// Denormalized target title.
    #[serde(default)]
    pub target_artifact_title: Option<String>,
}

/// Fields needed to build an [`Edge`]; `id` is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeInit {
    /// Source artifact.
    pub artifact_id: String,
    /// Source block.
    #[serde(default)]
    pub artifact_block_id: Option<String>,
    /// Target artifact.
    pub target_artifact_id: String,
    /// Target block.
    #[serde(default)]
    pub target_artifact_block_id: Option<String>,
    /// Target date.
    #[serde(default)]
    pub target_artifact_date: Option<String>,
    /// Source title.
    #[serde(default)]
    pub artifact_title: String,
    /// Target title; `None` means the target is unresolved.
    #[serde(default)]
    pub target_artifact_title: Option<String>,
}

impl Edge {
    /// Build a normalized edge: empty strings become `None`, the id is derived
    /// and `is_broken` reflects whether the target resolved.
    pub fn new(init: EdgeInit) -> Self {
        let artifact_block_id = non_empty(init.artifact_block_id);
        let target_artifact_block_id = non_empty(init.target_artifact_block_id);
        let target_artifact_date = non_empty(init.target_artifact_date);
        let id = edge_id(
            &init.artifact_id,
            artifact_block_id.as_deref(),
            &init.target_artifact_id,
            target_artifact_block_id.as_deref(),
            target_artifact_date.as_deref(),
        );
        let is_broken = init.target_artifact_title.is_none();
        Edge {
            id,
            artifact_id: init.artifact_id,
            artifact_block_id,
            target_artifact_id: init.target_artifact_id,
            target_artifact_block_id,
            target_artifact_date,
            is_broken,
            artifact_title: init.artifact_title,
            target_artifact_title: init.target_artifact_title,
        }
    }

    /// Re-normalize an edge received from elsewhere (network, share view).
    ///
    /// Coerces empty strings to `None` and recomputes the id, so rows built by
    /// either side of the reference collapse onto one key.
    pub fn normalized(self) -> Self {
        let is_broken = self.is_broken;
        let mut edge = Edge::new(EdgeInit {
            artifact_id: self.artifact_id,
            artifact_block_id: self.artifact_block_id,
            target_artifact_id: self.target_artifact_id,
            target_artifact_block_id: self.target_artifact_block_id,
            target_artifact_date: self.target_artifact_date,
            artifact_title: self.artifact_title,
            target_artifact_title: self.target_artifact_title,
        });
        edge.is_broken = edge.is_broken || is_broken;
        edge
    }

    /// True if this edge points at `block_id` inside its target artifact.
    pub fn targets_block(&self, block_id: &str) -> bool {
        self.target_artifact_block_id.as_deref() == Some(block_id)
    }
}

impl Entity for Edge {
    const COLLECTION: Collection = Collection::Edges;

    fn id(&self) -> &str {
        &self.id
    }
}
