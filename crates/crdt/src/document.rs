//! Replicated document: a map of LWW record registers plus a schema register.
//!
//! Deletes leave tombstones so a delete merged after a concurrent older put
//! still wins. The encoded form is MessagePack with named fields; the two
//! top-level keys are [`RECORDS_KEY`] and [`SCHEMA_KEY`] and must never
//! change, since every persisted replica is keyed on them.

use std::collections::BTreeMap;

use notesync_core::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crdt::{Crdt, Lww, ReplicaId, Stamp};
use crate::schema::SchemaDescriptor;

/// Key of the record map inside an encoded document.
pub const RECORDS_KEY: &str = "records";

/// Key of the schema descriptor inside an encoded document.
pub const SCHEMA_KEY: &str = "schema";

/// A record register; `None` is a tombstone.
pub type RecordRegister = Lww<Option<Value>>;

/// Highest counter seen from each replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<ReplicaId, u64>);

impl VersionVector {
    /// Empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest counter seen from `replica`.
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    /// Record that `stamp` has been seen.
    pub fn observe(&mut self, stamp: &Stamp) {
        let seen = self.0.entry(stamp.replica).or_insert(0);
        *seen = (*seen).max(stamp.counter);
    }

    /// Whether the write at `stamp` is already known.
    pub fn covers(&self, stamp: &Stamp) -> bool {
        stamp.counter <= self.get(&stamp.replica)
    }

    /// Largest counter from any replica.
    pub fn max_counter(&self) -> u64 {
        self.0.values().copied().max().unwrap_or(0)
    }

    /// Check if nothing has been seen.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Crdt for VersionVector {
    fn join(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (replica, counter) in &other.0 {
            out.observe(&Stamp::new(*counter, *replica));
        }
        out
    }
}

/// The mergeable content of a document; also the shape of updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Record registers by id, tombstones included.
    #[serde(rename = "records", default)]
    pub records: BTreeMap<String, RecordRegister>,
    /// Schema register.
    #[serde(rename = "schema", default)]
    pub schema: Option<Lww<SchemaDescriptor>>,
}

impl DocumentState {
    /// Check if the update carries nothing.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.schema.is_none()
    }

    /// Version vector covering every stamp in this state.
    pub fn version_vector(&self) -> VersionVector {
        let mut vv = VersionVector::new();
        for register in self.records.values() {
            vv.observe(&register.stamp);
        }
        if let Some(schema) = &self.schema {
            vv.observe(&schema.stamp);
        }
        vv
    }

    /// Decode a MessagePack-encoded state or update.
    pub fn decode(bytes: &[u8]) -> SyncResult<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| SyncError::serialization(format!("document decode: {e}")))
    }

    /// Encode with named fields.
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| SyncError::serialization(format!("document encode: {e}")))
    }
}

impl Crdt for DocumentState {
    fn join(&self, other: &Self) -> Self {
        let mut records = self.records.clone();
        for (id, theirs) in &other.records {
            let merged = match records.get(id) {
                Some(ours) => ours.join(theirs),
                None => theirs.clone(),
            };
            records.insert(id.clone(), merged);
        }
        let schema = match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => Some(a.join(b)),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        Self { records, schema }
    }
}

/// A visible change to a record caused by a merge.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordChange {
    /// The record now holds `value`.
    Upserted {
        /// Record id.
        id: String,
        /// New value.
        value: Value,
    },
    /// The record was deleted.
    Removed {
        /// Record id.
        id: String,
    },
}

impl RecordChange {
    /// Id of the changed record.
    pub fn id(&self) -> &str {
        match self {
            RecordChange::Upserted { id, .. } | RecordChange::Removed { id } => id,
        }
    }
}

/// One replica of a document.
#[derive(Debug, Clone)]
pub struct ReplicatedDocument {
    replica: ReplicaId,
    counter: u64,
    state: DocumentState,
    version: VersionVector,
}

impl ReplicatedDocument {
    /// An empty document written by `replica`.
    pub fn new(replica: ReplicaId) -> Self {
        Self::from_state(replica, DocumentState::default())
    }

    /// Resume a document from a persisted state.
    pub fn from_state(replica: ReplicaId, state: DocumentState) -> Self {
        let version = state.version_vector();
        Self {
            replica,
            counter: version.max_counter(),
            state,
            version,
        }
    }

    /// Resume a document from encoded bytes.
    pub fn decode(replica: ReplicaId, bytes: &[u8]) -> SyncResult<Self> {
        Ok(Self::from_state(replica, DocumentState::decode(bytes)?))
    }

    /// This replica's id.
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    fn next_stamp(&mut self) -> Stamp {
        self.counter += 1;
        let stamp = Stamp::new(self.counter, self.replica);
        self.version.observe(&stamp);
        stamp
    }

    /// Live value of record `id`.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.state.records.get(id).and_then(|r| r.value.as_ref())
    }

    /// Live records, tombstones excluded.
    pub fn records(&self) -> BTreeMap<String, Value> {
        self.state
            .records
            .iter()
            .filter_map(|(id, r)| r.value.clone().map(|v| (id.clone(), v)))
            .collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.state
            .records
            .values()
            .filter(|r| r.value.is_some())
            .count()
    }

    /// Check if there are no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write record `id`. A `null` value reads back as deleted once encoded.
    pub fn put(&mut self, id: impl Into<String>, value: Value) -> Stamp {
        let stamp = self.next_stamp();
        self.state
            .records
            .insert(id.into(), Lww::new(Some(value), stamp));
        stamp
    }

    /// Tombstone record `id`. Returns `None` when it was not live.
    pub fn delete(&mut self, id: &str) -> Option<Stamp> {
        self.get(id)?;
        let stamp = self.next_stamp();
        self.state
            .records
            .insert(id.to_string(), Lww::new(None, stamp));
        Some(stamp)
    }

    /// Current schema; empty for a document never stamped with one.
    pub fn schema(&self) -> SchemaDescriptor {
        self.state
            .schema
            .as_ref()
            .map(|s| s.value.clone())
            .unwrap_or_default()
    }

    /// Whether a schema has been written.
    pub fn has_schema(&self) -> bool {
        self.state.schema.is_some()
    }

    /// Stamp a new schema.
    pub fn set_schema(&mut self, schema: SchemaDescriptor) -> Stamp {
        let stamp = self.next_stamp();
        self.state.schema = Some(Lww::new(schema, stamp));
        stamp
    }

    /// Writes this replica has seen.
    pub fn version_vector(&self) -> &VersionVector {
        &self.version
    }

    /// Full state.
    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    /// Registers written after `since`.
    pub fn diff(&self, since: &VersionVector) -> DocumentState {
        let records = self
            .state
            .records
            .iter()
            .filter(|(_, r)| !since.covers(&r.stamp))
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        let schema = self
            .state
            .schema
            .as_ref()
            .filter(|s| !since.covers(&s.stamp))
            .cloned();
        DocumentState { records, schema }
    }

    /// Encode the full state.
    pub fn encode_state(&self) -> SyncResult<Vec<u8>> {
        self.state.encode()
    }

    /// Encode the registers a peer at `since` is missing.
    pub fn encode_diff(&self, since: &VersionVector) -> SyncResult<Vec<u8>> {
        self.diff(since).encode()
    }

    /// Merge an encoded state or update.
    pub fn apply_update(&mut self, update: &[u8]) -> SyncResult<Vec<RecordChange>> {
        let update = DocumentState::decode(update)?;
        Ok(self.merge(&update))
    }

    /// Merge `update`, returning the records whose visible value changed.
    pub fn merge(&mut self, update: &DocumentState) -> Vec<RecordChange> {
        let mut changes = Vec::new();
        for (id, theirs) in &update.records {
            let before = self.get(id).cloned();
            let merged = match self.state.records.get(id) {
                Some(ours) => ours.join(theirs),
                None => theirs.clone(),
            };
            let after = merged.value.clone();
            self.state.records.insert(id.clone(), merged);
            if before != after {
                changes.push(match after {
                    Some(value) => RecordChange::Upserted {
                        id: id.clone(),
                        value,
                    },
                    None => RecordChange::Removed { id: id.clone() },
                });
            }
        }
        if let Some(theirs) = &update.schema {
            self.state.schema = Some(match &self.state.schema {
                Some(ours) => ours.join(theirs),
                None => theirs.clone(),
            });
        }
        self.version = self.version.join(&update.version_vector());
        self.counter = self.counter.max(self.version.max_counter());
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::laws::check_crdt_laws;
    use proptest::prelude::*;
    use serde_json::json;

    fn pair() -> (ReplicatedDocument, ReplicatedDocument) {
        (
            ReplicatedDocument::new(ReplicaId::new()),
            ReplicatedDocument::new(ReplicaId::new()),
        )
    }

    #[test]
    fn encoded_state_uses_well_known_keys() {
        let mut doc = ReplicatedDocument::new(ReplicaId::new());
        doc.put("s1", json!({"x": 1}));
        doc.set_schema(SchemaDescriptor::new(["init"]));
        let bytes = doc.encode_state().unwrap();
        let top: BTreeMap<String, serde::de::IgnoredAny> = rmp_serde::from_slice(&bytes).unwrap();
        let keys: Vec<&str> = top.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![RECORDS_KEY, SCHEMA_KEY]);
    }

    #[test]
    fn state_round_trips_through_bytes() {
        let mut doc = ReplicatedDocument::new(ReplicaId::new());
        doc.put("s1", json!({"x": 1}));
        doc.put("s2", json!("two"));
        doc.delete("s2");
        let restored = ReplicatedDocument::decode(ReplicaId::new(), &doc.encode_state().unwrap()).unwrap();
        assert_eq!(restored.state(), doc.state());
        assert_eq!(restored.records().len(), 1);
    }

    #[test]
    fn delete_beats_older_concurrent_put() {
        let (mut a, mut b) = pair();
        a.put("s1", json!(1));
        b.apply_update(&a.encode_state().unwrap()).unwrap();
        b.delete("s1");
        a.put("other", json!(2));

        let changes = a.apply_update(&b.encode_state().unwrap()).unwrap();
        assert_eq!(changes, vec![RecordChange::Removed { id: "s1".into() }]);
        assert!(a.get("s1").is_none());
    }

    #[test]
    fn diff_carries_only_unseen_writes() {
        let (mut a, mut b) = pair();
        a.put("s1", json!(1));
        b.apply_update(&a.encode_state().unwrap()).unwrap();
        a.put("s2", json!(2));

        let diff = a.diff(b.version_vector());
        assert_eq!(diff.records.keys().collect::<Vec<_>>(), vec!["s2"]);

        b.merge(&diff);
        assert_eq!(b.records(), a.records());
        assert!(a.diff(b.version_vector()).is_empty());
    }

    #[test]
    fn local_writes_outrank_merged_history() {
        let (mut a, mut b) = pair();
        for i in 0..5 {
            a.put("s1", json!(i));
        }
        b.apply_update(&a.encode_state().unwrap()).unwrap();
        b.put("s1", json!("b"));
        a.apply_update(&b.encode_state().unwrap()).unwrap();
        assert_eq!(a.get("s1"), Some(&json!("b")));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u8),
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
            (0u8..4).prop_map(Op::Delete),
        ]
    }

    fn run(doc: &mut ReplicatedDocument, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    doc.put(format!("r{k}"), json!(v));
                }
                Op::Delete(k) => {
                    doc.delete(&format!("r{k}"));
                }
            }
        }
    }

    proptest! {
        #[test]
        fn replicas_converge_in_any_merge_order(
            ops_a in prop::collection::vec(op(), 0..12),
            ops_b in prop::collection::vec(op(), 0..12),
            ops_c in prop::collection::vec(op(), 0..12),
        ) {
            let mut a = ReplicatedDocument::new(ReplicaId::new());
            let mut b = ReplicatedDocument::new(ReplicaId::new());
            let mut c = ReplicatedDocument::new(ReplicaId::new());
            run(&mut a, &ops_a);
            run(&mut b, &ops_b);
            run(&mut c, &ops_c);

            let (sa, sb, sc) = (a.state().clone(), b.state().clone(), c.state().clone());
            check_crdt_laws(sa.clone(), sb.clone(), sc.clone());

            let mut x = a.clone();
            x.merge(&sb);
            x.merge(&sc);
            let mut y = c.clone();
            y.merge(&sa);
            y.merge(&sb);
            y.merge(&sb);
            prop_assert_eq!(x.records(), y.records());
            prop_assert_eq!(x.state(), y.state());
        }
    }
}
