//! Named collections of the local store.
//!
//! Each collection mirrors one server-authoritative resource (or one piece of
//! client-only state such as the write queue). Secondary indices are declared
//! statically per collection so the store never has to discover them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A secondary index: rows are keyed by the value of `field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name, used by `get_all_from_index`.
    pub name: &'static str,
    /// Top-level row field the index is built from.
    pub field: &'static str,
}

/// A named collection in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    /// Artifact summaries (`artifact.getArtifacts`).
    Artifacts,
    /// Historical versions of artifacts.
    ArtifactVersions,
    /// Artifact bodies, gated by the snapshot watermark.
    ArtifactSnapshots,
    /// References between artifacts.
    Edges,
    /// Import/export job summaries.
    Jobs,
    /// Users the client has seen.
    KnownUsers,
    /// Files uploaded while offline, plus confirmed uploads.
    PendingFiles,
    /// Mutations captured while offline.
    PendingWrites,
    /// Persisted replicated documents (opaque blobs).
    Documents,
    /// Scalar key-value area (watermarks).
    #[serde(rename = "keyval")]
    KeyVal,
}

const EDGE_INDICES: &[IndexDef] = &[
    IndexDef {
        name: "artifactId",
        field: "artifactId",
    },
    IndexDef {
        name: "targetArtifactId",
        field: "targetArtifactId",
    },
];

const VERSION_INDICES: &[IndexDef] = &[IndexDef {
    name: "artifactId",
    field: "artifactId",
}];

const JOB_INDICES: &[IndexDef] = &[IndexDef {
    name: "type",
    field: "type",
}];

const PENDING_FILE_INDICES: &[IndexDef] = &[IndexDef {
    name: "status",
    field: "status",
}];

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Collection; 10] = [
        Collection::Artifacts,
        Collection::ArtifactVersions,
        Collection::ArtifactSnapshots,
        Collection::Edges,
        Collection::Jobs,
        Collection::KnownUsers,
        Collection::PendingFiles,
        Collection::PendingWrites,
        Collection::Documents,
        Collection::KeyVal,
    ];

    /// Persisted name of the collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Artifacts => "artifacts",
            Collection::ArtifactVersions => "artifactVersions",
            Collection::ArtifactSnapshots => "artifactSnapshots",
            Collection::Edges => "edges",
            Collection::Jobs => "jobs",
            Collection::KnownUsers => "knownUsers",
            Collection::PendingFiles => "pendingFiles",
            Collection::PendingWrites => "pendingWrites",
            Collection::Documents => "documents",
            Collection::KeyVal => "keyval",
        }
    }

    /// Secondary indices declared on this collection.
    pub fn indices(&self) -> &'static [IndexDef] {
        match self {
            Collection::Edges => EDGE_INDICES,
            Collection::ArtifactVersions => VERSION_INDICES,
            Collection::Jobs => JOB_INDICES,
            Collection::PendingFiles => PENDING_FILE_INDICES,
            _ => &[],
        }
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&'static IndexDef> {
        self.indices().iter().find(|idx| idx.name == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SyncError::UnknownCollection {
                name: s.to_string(),
            })
    }
}
