//! Write queue: mutations captured while offline.
//!
//! A mutation that could not reach the server is stored in the
//! `pendingWrites` collection with a monotonically increasing sequence, so it
//! survives restarts. [`WriteQueue::replay`] sends the queue in order:
//!
//! - 2xx: the item is removed, and the removal is committed before the next
//!   item is sent, so a crash never replays a confirmed mutation.
//! - connectivity failure: replay stops; the item stays at the head.
//! - any other failure: the attempt is counted and replay stops (order is
//!   preserved); after `max_attempts` the item is dropped and reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notesync_core::{tagged, Clock, Collection, Entity, QueueConfig, SyncError, SyncResult};
use notesync_storage::{LocalStore, Table};
use notesync_wire::{HttpRequest, Procedure};
use serde::{Deserialize, Serialize};

use crate::handlers::files;
use crate::transport::Transport;

/// Width of the zero-padded sequence used as the row id; keeps id order
/// equal to FIFO order.
const SEQUENCE_WIDTH: usize = 20;

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    /// Zero-padded sequence.
    pub id: String,
    /// FIFO position.
    pub sequence: u64,
    /// Dotted procedure name.
    pub procedure: String,
    /// Client-generated id of the entity the mutation targets.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// The original request, replayed verbatim.
    pub request: HttpRequest,
    /// When the mutation was captured.
    #[serde(with = "tagged::date")]
    pub created_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Last replay failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Earliest time of the next attempt.
    #[serde(with = "tagged::option_date", default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Entity for PendingWrite {
    const COLLECTION: Collection = Collection::PendingWrites;

    fn id(&self) -> &str {
        &self.id
    }
}

impl PendingWrite {
    /// Parsed procedure, if it is one the registry knows.
    pub fn procedure(&self) -> Option<Procedure> {
        self.procedure.parse().ok()
    }
}

/// How permanently failing replays are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before an item is dropped.
    pub max_attempts: u32,
    /// Base of the exponential backoff.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempts` failures.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }

    /// Whether an item with `attempts` failures should be dropped.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Items confirmed and removed.
    pub replayed: usize,
    /// Items that failed and stay queued.
    pub failed: usize,
    /// Items dropped after exhausting their attempts.
    pub dropped: usize,
    /// Items still queued after the pass.
    pub remaining: usize,
}

/// Durable FIFO of offline mutations.
pub struct WriteQueue {
    store: Arc<LocalStore>,
    table: Table<PendingWrite>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    next_sequence: AtomicU64,
    replaying: tokio::sync::Mutex<()>,
}

impl WriteQueue {
    /// Queue stored in `store`. Sequencing resumes after the highest stored item.
    pub fn new(store: Arc<LocalStore>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> SyncResult<Self> {
        let table = store.table::<PendingWrite>();
        let last = table
            .get_all()?
            .iter()
            .map(|w| w.sequence)
            .max()
            .unwrap_or(0);
        Ok(Self {
            store,
            table,
            clock,
            policy,
            next_sequence: AtomicU64::new(last + 1),
            replaying: tokio::sync::Mutex::new(()),
        })
    }

    /// Persist `request` for later replay.
    pub fn enqueue(
        &self,
        request: HttpRequest,
        procedure: Procedure,
        entity_id: Option<String>,
    ) -> SyncResult<PendingWrite> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let write = PendingWrite {
            id: format!("{sequence:0width$}", width = SEQUENCE_WIDTH),
            sequence,
            procedure: procedure.name().to_string(),
            entity_id,
            request,
            created_at: self.clock.now(),
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
        };
        self.table.put(&write)?;
        tracing::info!(
            target: "notesync::queue",
            sequence,
            procedure = %procedure,
            "Queued mutation for replay"
        );
        Ok(write)
    }

    /// Queued items in FIFO order.
    pub fn pending(&self) -> SyncResult<Vec<PendingWrite>> {
        self.table.get_all()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.table.count()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retry policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send queued items in order until the queue drains or an item fails.
    ///
    /// Concurrent calls are serialized.
    pub async fn replay(&self, transport: &dyn Transport) -> SyncResult<ReplayReport> {
        let _guard = self.replaying.lock().await;
        let mut report = ReplayReport::default();

        for mut write in self.pending()? {
            let now = self.clock.now();
            if write.next_attempt_at.is_some_and(|at| at > now) {
                break;
            }

            let failure = match transport.send(write.request.clone()).await {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(SyncError::HttpStatus {
                    status: response.status,
                }),
                Err(e) if e.is_connectivity() => {
                    tracing::debug!(
                        target: "notesync::queue",
                        sequence = write.sequence,
                        error = %e,
                        "Replay paused, still offline"
                    );
                    break;
                }
                Err(e) => Some(e),
            };

            match failure {
                None => {
                    self.store.delete(Collection::PendingWrites, &write.id)?;
                    self.after_confirmed(&write);
                    report.replayed += 1;
                }
                Some(e) => {
                    write.attempts += 1;
                    if self.policy.exhausted(write.attempts) {
                        tracing::warn!(
                            target: "notesync::queue",
                            sequence = write.sequence,
                            procedure = %write.procedure,
                            attempts = write.attempts,
                            error = %e,
                            "Dropping mutation after repeated failures"
                        );
                        self.store.delete(Collection::PendingWrites, &write.id)?;
                        report.dropped += 1;
                        continue;
                    }
                    let delay = chrono::Duration::from_std(self.policy.backoff(write.attempts))
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    write.last_error = Some(e.to_string());
                    write.next_attempt_at = Some(now + delay);
                    self.table.put(&write)?;
                    report.failed += 1;
                    break;
                }
            }
        }

        report.remaining = self.len();
        if report != ReplayReport::default() {
            tracing::info!(
                target: "notesync::queue",
                replayed = report.replayed,
                failed = report.failed,
                dropped = report.dropped,
                remaining = report.remaining,
                "Replay pass finished"
            );
        }
        Ok(report)
    }

    /// Local follow-up once the server confirmed a replayed mutation.
    fn after_confirmed(&self, write: &PendingWrite) {
        if write.procedure() != Some(Procedure::UploadFile) {
            return;
        }
        if let Some(id) = write.entity_id.as_deref() {
            if let Err(e) = files::confirm(&self.store, id) {
                tracing::warn!(
                    target: "notesync::queue",
                    file_id = id,
                    error = %e,
                    "Failed to mark file confirmed"
                );
            }
        }
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("len", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}
