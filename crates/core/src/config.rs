//! Sync configuration
//!
//! Product-tunable constants live here rather than in the handlers: the
//! snapshot staleness window, the default page size for offline listings, the
//! two CRDT cadences and the write queue's retry policy. Loaded from TOML;
//! every field has a default so an empty file is valid.
//!
//! ```toml
//! api_base_url = "https://api.example.com"
//! default_page_size = 10
//! snapshot_validity_days = 30
//! compact_after_records = 1000
//!
//! [queue]
//! max_attempts = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Retry policy for replaying queued mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Replay attempts before a permanently failing item is dropped.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff between attempts.
    pub backoff_base_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 500,
        }
    }
}

impl QueueConfig {
    /// Delay before attempt number `attempts + 1`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exp))
    }
}

/// Configuration for the sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Production API base URL; requests under it are intercepted.
    pub api_base_url: String,
    /// Same-origin API prefix; requests under it are intercepted too.
    pub api_prefix: String,
    /// Page size for offline listings when the request carries no `limit`.
    pub default_page_size: usize,
    /// Cached snapshots older than this many days are not served offline.
    pub snapshot_validity_days: i64,
    /// Presence broadcast granularity.
    pub presence_interval_ms: u64,
    /// Durable flush granularity.
    pub flush_interval_ms: u64,
    /// Peers silent for longer than this are dropped from presence.
    pub awareness_timeout_ms: u64,
    /// Compact the store's log once it holds this many records; 0 never.
    pub compact_after_records: u64,
    /// Write queue retry policy.
    pub queue: QueueConfig,
    /// Directory for the persistent store; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.notesync.app".to_string(),
            api_prefix: "/api".to_string(),
            default_page_size: 10,
            snapshot_validity_days: 30,
            presence_interval_ms: 20,
            flush_interval_ms: 1000,
            awareness_timeout_ms: 30_000,
            compact_after_records: 1000,
            queue: QueueConfig::default(),
            data_dir: None,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(src)
            .map_err(|e| SyncError::invalid_input(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| SyncError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&src)
    }

    /// Reject values the sync core cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.default_page_size == 0 {
            return Err(SyncError::invalid_input("default_page_size must be > 0"));
        }
        if self.snapshot_validity_days < 0 {
            return Err(SyncError::invalid_input(
                "snapshot_validity_days must not be negative",
            ));
        }
        if self.presence_interval_ms == 0 || self.flush_interval_ms == 0 {
            return Err(SyncError::invalid_input("cadences must be > 0 ms"));
        }
        if self.presence_interval_ms > self.flush_interval_ms {
            return Err(SyncError::invalid_input(
                "presence_interval_ms must not exceed flush_interval_ms",
            ));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(SyncError::invalid_input("api_prefix must start with '/'"));
        }
        if self.queue.max_attempts == 0 {
            return Err(SyncError::invalid_input("queue.max_attempts must be > 0"));
        }
        Ok(())
    }

    /// Snapshot validity window.
    pub fn snapshot_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.snapshot_validity_days)
    }

    /// Presence cadence.
    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    /// Durable flush cadence.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Silence after which a presence peer is dropped.
    pub fn awareness_timeout(&self) -> Duration {
        Duration::from_millis(self.awareness_timeout_ms)
    }
}
