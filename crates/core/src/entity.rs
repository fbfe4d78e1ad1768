//! Server-authoritative entities mirrored in the local store.
//!
//! Field names follow the wire format (camelCase). Dates use the `$date`
//! wrapper and binary bodies the `$bytes` wrapper, so a row read back from
//! the store serializes to exactly what the server sent.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::tagged;

/// A record that lives in one collection of the local store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the entity is stored in.
    const COLLECTION: Collection;

    /// Primary key.
    fn id(&self) -> &str;
}

/// Summary of an artifact (note, drawing, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    /// Artifact id.
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// Body kind, e.g. `tiptap` or `tldraw`.
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Whether the owner pinned it.
    #[serde(default)]
    pub pinned: bool,
    /// Creation time.
    #[serde(with = "tagged::date")]
    pub created_at: DateTime<Utc>,
    /// Last server-side modification.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ArtifactSummary {
    const COLLECTION: Collection = Collection::Artifacts;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One historical version of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVersion {
    /// Version id.
    pub id: String,
    /// Artifact this version belongs to.
    pub artifact_id: String,
    /// Title at the time of the version.
    pub title: String,
    /// Monotonic version number.
    pub version: u64,
    /// When the version was recorded.
    #[serde(with = "tagged::date")]
    pub created_at: DateTime<Utc>,
    /// Last modification.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ArtifactVersion {
    const COLLECTION: Collection = Collection::ArtifactVersions;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Full body of an artifact, served offline only while fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSnapshot {
    /// Artifact id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Body kind.
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Encoded document body.
    #[serde(with = "tagged::bytes")]
    pub body: Vec<u8>,
    /// Last server-side modification.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for ArtifactSnapshot {
    const COLLECTION: Collection = Collection::ArtifactSnapshots;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Summary of a server-side job (import, export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Job id.
    pub id: String,
    /// Job kind, e.g. `import` or `export`.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Status string as reported by the server.
    pub status: String,
    /// Progress percentage.
    #[serde(default)]
    pub progress: u8,
    /// Creation time; offline listings sort on it.
    #[serde(with = "tagged::date")]
    pub created_at: DateTime<Utc>,
    /// Last modification.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for JobSummary {
    const COLLECTION: Collection = Collection::Jobs;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A user the client has interacted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownUser {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Last modification.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for KnownUser {
    const COLLECTION: Collection = Collection::KnownUsers;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Whether a file row is locally staged or confirmed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Written optimistically while offline; not yet confirmed.
    Staged,
    /// Confirmed by a server response.
    Confirmed,
}

/// A file attached to an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    /// Client-generated file id.
    pub id: String,
    /// Artifact the file is attached to.
    pub artifact_id: String,
    /// Original file name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Staged or confirmed.
    pub status: FileStatus,
    /// When the upload was attempted.
    #[serde(with = "tagged::date")]
    pub created_at: DateTime<Utc>,
}

impl Entity for PendingFile {
    const COLLECTION: Collection = Collection::PendingFiles;

    fn id(&self) -> &str {
        &self.id
    }
}
