//! Error taxonomy for the sync core.
//!
//! Every layer reports failures through [`SyncError`]. The variants follow
//! how a failure is recovered:
//!
//! | Variant | Recovery |
//! |---------|----------|
//! | `MissingInput`, `InvalidInput` | fatal to the single request |
//! | `Network` | reads fall back to the local store, writes are queued |
//! | `HttpStatus` | surfaced to the caller (server answered) |
//! | `NotFound`, `StaleCache` | cache miss, the network error is surfaced instead |
//! | `SchemaDrift` | fatal, the client must reload with newer code |
//! | `Storage`, `Corruption`, `Serialization` | local persistence failures |

use thiserror::Error;

/// Result type used throughout notesync.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A parametrized read did not carry a required identifier.
    #[error("missing input '{field}' for procedure {procedure}")]
    MissingInput {
        /// Dotted procedure name (e.g. `artifact.getArtifactById`).
        procedure: String,
        /// Name of the missing input field.
        field: &'static str,
    },

    /// Input was present but malformed.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with it.
        message: String,
    },

    /// The transport could not reach the server.
    #[error("network failure: {reason}")]
    Network {
        /// Transport-level reason.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("server responded with status {status}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
    },

    /// A row was not present in the local store.
    #[error("{collection} row '{id}' not found")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Primary key that was looked up.
        id: String,
    },

    /// Cached rows exist but are too old to be served silently.
    #[error("cached {collection} too stale to serve ({age_days} days since last sync)")]
    StaleCache {
        /// Collection name.
        collection: String,
        /// Days since the collection was last confirmed fresh (-1 when never).
        age_days: i64,
    },

    /// The remote document schema carries migrations this client does not know.
    #[error("remote schema is newer than local: {detail}")]
    SchemaDrift {
        /// Which sequence is ahead and by how much.
        detail: String,
    },

    /// An indexed field held an empty string.
    #[error("index '{index}' on {collection} cannot key on an empty string (row '{id}')")]
    InvalidIndexValue {
        /// Collection name.
        collection: String,
        /// Index name.
        index: String,
        /// Offending row id.
        id: String,
    },

    /// A collection or index name did not resolve.
    #[error("unknown collection or index '{name}'")]
    UnknownCollection {
        /// The name that failed to resolve.
        name: String,
    },

    /// Encoding or decoding failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Details.
        message: String,
    },

    /// Persistent storage failed.
    #[error("storage error: {message}")]
    Storage {
        /// Details.
        message: String,
        /// Underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Persisted state failed an integrity check.
    #[error("data corruption: {message}")]
    Corruption {
        /// Details.
        message: String,
    },

    /// Invariant violation inside notesync.
    #[error("internal error: {message}")]
    Internal {
        /// Details.
        message: String,
    },
}

impl SyncError {
    /// Build a `MissingInput` error.
    pub fn missing_input(procedure: impl Into<String>, field: &'static str) -> Self {
        SyncError::MissingInput {
            procedure: procedure.into(),
            field,
        }
    }

    /// Build an `InvalidInput` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SyncError::InvalidInput {
            message: message.into(),
        }
    }

    /// Build a `Network` error.
    pub fn network(reason: impl Into<String>) -> Self {
        SyncError::Network {
            reason: reason.into(),
        }
    }

    /// Build a `NotFound` error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Build a `SchemaDrift` error.
    pub fn schema_drift(detail: impl Into<String>) -> Self {
        SyncError::SchemaDrift {
            detail: detail.into(),
        }
    }

    /// Build a `Serialization` error.
    pub fn serialization(message: impl Into<String>) -> Self {
        SyncError::Serialization {
            message: message.into(),
        }
    }

    /// Build a `Storage` error without an I/O source.
    pub fn storage(message: impl Into<String>) -> Self {
        SyncError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Build a `Storage` error wrapping an I/O error.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Storage {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Build a `Corruption` error.
    pub fn corruption(message: impl Into<String>) -> Self {
        SyncError::Corruption {
            message: message.into(),
        }
    }

    /// Build an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }

    /// True for failures that mean "the server could not be reached".
    ///
    /// Only these trigger cache fallback for reads and queue capture for writes.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }

    /// True for cache misses that a fallback handler may report.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound { .. } | SyncError::StaleCache { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_is_connectivity() {
        assert!(SyncError::network("offline").is_connectivity());
        assert!(!SyncError::HttpStatus { status: 500 }.is_connectivity());
        assert!(!SyncError::missing_input("job.getJobs", "id").is_connectivity());
    }

    #[test]
    fn cache_miss_classification() {
        assert!(SyncError::not_found("artifacts", "a1").is_cache_miss());
        assert!(SyncError::StaleCache {
            collection: "artifactSnapshots".into(),
            age_days: 31
        }
        .is_cache_miss());
        assert!(!SyncError::network("down").is_cache_miss());
    }

    #[test]
    fn missing_input_message_names_field() {
        let err = SyncError::missing_input("artifact.getArtifactById", "id");
        let msg = err.to_string();
        assert!(msg.contains("'id'"));
        assert!(msg.contains("artifact.getArtifactById"));
    }

    #[test]
    fn json_error_converts_to_serialization() {
        let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, SyncError::Serialization { .. }));
    }
}
