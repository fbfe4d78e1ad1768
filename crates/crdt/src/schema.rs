//! Document schema and record migrations.
//!
//! A schema is the ordered list of migration ids a document has been through.
//! A client knows a fixed [`MigrationSet`]; a remote schema naming a migration
//! outside that set is newer than the running code and cannot be merged
//! safely.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use notesync_core::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Migrations a document has been through, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Migration ids.
    pub migrations: Vec<String>,
}

impl SchemaDescriptor {
    /// Descriptor naming `migrations`.
    pub fn new<I, S>(migrations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            migrations: migrations.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of migrations applied.
    pub fn version(&self) -> usize {
        self.migrations.len()
    }

    /// Whether migration `id` has been applied.
    pub fn contains(&self, id: &str) -> bool {
        self.migrations.iter().any(|m| m == id)
    }
}

/// How a remote schema relates to the running code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrder {
    /// Same migrations.
    Same,
    /// The remote lags behind; it can be migrated forward.
    LocalNewer,
    /// The remote names migrations this client does not know.
    RemoteNewer,
}

/// Rewrites one record. Returning `None` deletes it.
pub type MigrateFn = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

struct Migration {
    id: String,
    up: MigrateFn,
}

/// Result of migrating a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    /// Records after migration.
    pub records: BTreeMap<String, Value>,
    /// Ids of records the migrations deleted, sorted.
    pub removed: Vec<String>,
    /// Migrations that ran, in order.
    pub applied: Vec<String>,
    /// Schema of the migrated snapshot.
    pub schema: SchemaDescriptor,
}

/// The migrations compiled into this client, in order.
#[derive(Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl Clone for Migration {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            up: Arc::clone(&self.up),
        }
    }
}

impl MigrationSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration.
    pub fn with<F>(mut self, id: impl Into<String>, up: F) -> Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.migrations.push(Migration {
            id: id.into(),
            up: Arc::new(up),
        });
        self
    }

    /// Schema of a document fully migrated by this client.
    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor::new(self.migrations.iter().map(|m| m.id.clone()))
    }

    fn knows(&self, id: &str) -> bool {
        self.migrations.iter().any(|m| m.id == id)
    }

    fn unknown<'a>(&self, schema: &'a SchemaDescriptor) -> Vec<&'a str> {
        schema
            .migrations
            .iter()
            .filter(|id| !self.knows(id))
            .map(String::as_str)
            .collect()
    }

    /// Compare `remote` against the running code.
    pub fn compare(&self, remote: &SchemaDescriptor) -> SchemaOrder {
        if !self.unknown(remote).is_empty() {
            SchemaOrder::RemoteNewer
        } else if remote.version() < self.migrations.len() {
            SchemaOrder::LocalNewer
        } else {
            SchemaOrder::Same
        }
    }

    /// Fail with `SchemaDrift` when `remote` is ahead of this client.
    pub fn check(&self, remote: &SchemaDescriptor) -> SyncResult<SchemaOrder> {
        match self.compare(remote) {
            SchemaOrder::RemoteNewer => Err(SyncError::schema_drift(format!(
                "unknown migrations [{}]",
                self.unknown(remote).join(", ")
            ))),
            order => Ok(order),
        }
    }

    /// Migrate `records` from schema `from` to schema `to`.
    ///
    /// Migrations run forward only: one applied by `from` is never undone,
    /// so the resulting schema covers both `from` and `to`.
    pub fn migrate(
        &self,
        records: BTreeMap<String, Value>,
        from: &SchemaDescriptor,
        to: &SchemaDescriptor,
    ) -> SyncResult<Migrated> {
        self.check(from)?;
        self.check(to)?;

        let mut records = records;
        let mut removed = Vec::new();
        let mut applied = Vec::new();
        for migration in &self.migrations {
            if !to.contains(&migration.id) || from.contains(&migration.id) {
                continue;
            }
            let mut next = BTreeMap::new();
            for (id, value) in records {
                match (migration.up)(value) {
                    Some(value) => {
                        next.insert(id, value);
                    }
                    None => removed.push(id),
                }
            }
            records = next;
            applied.push(migration.id.clone());
        }
        removed.sort();
        removed.dedup();

        let schema = SchemaDescriptor::new(
            self.migrations
                .iter()
                .filter(|m| from.contains(&m.id) || to.contains(&m.id))
                .map(|m| m.id.clone()),
        );
        Ok(Migrated {
            records,
            removed,
            applied,
            schema,
        })
    }
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.migrations.iter().map(|m| &m.id))
            .finish()
    }
}
