//! Merge primitives.
//!
//! Every replicated value is a last-writer-wins register stamped with a
//! Lamport [`Stamp`]. Stamps order first by counter, then by replica id, so
//! two replicas never produce equal stamps for different writes and every
//! replica picks the same winner.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conflict-free replicated data type.
///
/// Laws:
/// - Commutative: join(a, b) == join(b, a)
/// - Associative: join(join(a, b), c) == join(a, join(b, c))
/// - Idempotent: join(a, a) == a
pub trait Crdt: Sized {
    /// Merge two states into one that includes information from both.
    fn join(&self, other: &Self) -> Self;
}

/// Identity of one replica of a document (one device, one tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// A fresh random replica id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lamport timestamp of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Logical time.
    pub counter: u64,
    /// Writer; breaks ties between equal counters.
    pub replica: ReplicaId,
}

impl Stamp {
    /// Stamp at `counter` by `replica`.
    pub fn new(counter: u64, replica: ReplicaId) -> Self {
        Self { counter, replica }
    }
}

/// Last-writer-wins register.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lww<T> {
    /// Current value.
    pub value: T,
    /// Stamp of the write that produced it.
    pub stamp: Stamp,
}

impl<T> Lww<T> {
    /// Register holding `value` written at `stamp`.
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }
}

impl<T: Clone> Crdt for Lww<T> {
    fn join(&self, other: &Self) -> Self {
        if self.stamp >= other.stamp {
            self.clone()
        } else {
            other.clone()
        }
    }
}

impl<T: PartialEq> PartialEq for Lww<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.stamp == other.stamp
    }
}

impl<T: Eq> Eq for Lww<T> {}
