//! Stored rows
//!
//! A [`Row`] is a JSON object with a string `id` field, the unit the local
//! store keys, indexes and persists. Rows are built from typed entities via
//! serde and read back the same way; the store itself never needs to know the
//! entity type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::entity::Entity;
use crate::error::{SyncError, SyncResult};

/// Name of the primary key field every row carries.
pub const ID_FIELD: &str = "id";

/// A stored record.
///
/// Newtype around `serde_json::Value` guaranteeing an object with a string
/// `id`. Construction validates the shape; `Deref` gives read access to the
/// underlying value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Row(serde_json::Value);

impl Row {
    /// Wrap a JSON value, checking it is an object with a non-empty string `id`.
    pub fn new(value: serde_json::Value) -> SyncResult<Self> {
        match value.get(ID_FIELD) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(Row(value)),
            Some(serde_json::Value::String(_)) => {
                Err(SyncError::invalid_input("row id must not be empty"))
            }
            _ if !value.is_object() => Err(SyncError::invalid_input("row must be a JSON object")),
            _ => Err(SyncError::invalid_input("row must carry a string 'id'")),
        }
    }

    /// Serialize a typed entity into a row.
    pub fn from_entity<T: Entity>(entity: &T) -> SyncResult<Self> {
        let value = serde_json::to_value(entity)?;
        Row::new(value)
    }

    /// Deserialize the row into a typed entity.
    pub fn to_entity<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_value(self.0.clone()).map_err(SyncError::from)
    }

    /// Consume the row into a typed entity.
    pub fn into_entity<T: DeserializeOwned>(self) -> SyncResult<T> {
        serde_json::from_value(self.0).map_err(SyncError::from)
    }

    /// Primary key.
    pub fn id(&self) -> &str {
        // Shape is checked on construction.
        self.0
            .get(ID_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    /// Top-level field, if present and not `null`.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// Top-level string field, if present.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|v| v.as_str())
    }

    /// Key a field contributes to a secondary index.
    ///
    /// `null` and absent fields are not indexed. Scalars are rendered to their
    /// string form; an empty string is returned as `Some("")` so the store
    /// can reject it.
    pub fn index_key(&self, field: &str) -> Option<String> {
        match self.field(field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Get the underlying JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Unwrap into the underlying JSON value.
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Deref for Row {
    type Target = serde_json::Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<serde_json::Value> for Row {
    type Error = SyncError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Row::new(value)
    }
}

impl From<Row> for serde_json::Value {
    fn from(row: Row) -> Self {
        row.0
    }
}
