//! Document store abstraction
//!
//! The ledger only talks to storage through [`DocumentStore`]: named
//! collections of JSON documents with a per-document version counter.
//! `commit` applies a list of writes atomically and is the only write
//! primitive backends implement; `set`, `update` and `delete` are built on it.
//!
//! # Backends
//!
//! - [`MemoryStore`] - process-local maps, used by tests
//! - [`RocksStore`] - RocksDB, one column family per collection

pub mod memory;
pub mod query;
pub mod rocks;

pub use memory::MemoryStore;
pub use query::{Direction, Filter, OrderBy, Query};
pub use rocks::RocksStore;

use crate::{
    config::{Config, StoreBackend},
    Error, Result,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Document body
pub type Fields = Map<String, Value>;

/// Stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID, unique within its collection
    pub id: String,

    /// Incremented on every write, starts at 1
    pub version: u64,

    /// Document body
    pub fields: Fields,
}

impl Document {
    /// Decode the body into a typed record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Encode a typed record as a document body
pub fn encode<T: Serialize>(record: &T) -> Result<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::Other(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Single write inside a commit
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or fully replace
    Set {
        /// Target collection
        collection: String,
        /// Document ID
        id: String,
        /// New body
        fields: Fields,
    },

    /// Merge fields into an existing document
    Update {
        /// Target collection
        collection: String,
        /// Document ID
        id: String,
        /// Fields to overwrite, others are kept
        fields: Fields,
        /// Abort the commit unless the stored version matches
        expected_version: Option<u64>,
    },

    /// Remove a document
    Delete {
        /// Target collection
        collection: String,
        /// Document ID
        id: String,
        /// Abort the commit with `NotFound` when the document is absent;
        /// otherwise deleting a missing document is a no-op
        must_exist: bool,
    },
}

impl WriteOp {
    /// Set op
    pub fn set(collection: &str, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Set {
            collection: collection.to_string(),
            id: id.into(),
            fields,
        }
    }

    /// Unconditional update op
    pub fn update(collection: &str, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Update {
            collection: collection.to_string(),
            id: id.into(),
            fields,
            expected_version: None,
        }
    }

    /// Compare-and-swap update op
    pub fn update_if(
        collection: &str,
        id: impl Into<String>,
        fields: Fields,
        expected_version: u64,
    ) -> Self {
        WriteOp::Update {
            collection: collection.to_string(),
            id: id.into(),
            fields,
            expected_version: Some(expected_version),
        }
    }

    /// Delete op, no-op when absent
    pub fn delete(collection: &str, id: impl Into<String>) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            id: id.into(),
            must_exist: false,
        }
    }

    /// Delete op that fails the commit when the document is absent
    pub fn delete_existing(collection: &str, id: impl Into<String>) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            id: id.into(),
            must_exist: true,
        }
    }

    /// Target collection and document ID
    pub fn target(&self) -> (&str, &str) {
        match self {
            WriteOp::Set { collection, id, .. }
            | WriteOp::Update { collection, id, .. }
            | WriteOp::Delete { collection, id, .. } => (collection, id),
        }
    }
}

/// Apply one op to the current state of its target document.
///
/// Shared by every backend so the version and precondition rules are
/// identical. Returns the new state (`None` = deleted / absent).
pub(crate) fn apply_op(current: Option<&Document>, op: &WriteOp) -> Result<Option<Document>> {
    let next_version = current.map(|doc| doc.version + 1).unwrap_or(1);

    match op {
        WriteOp::Set { id, fields, .. } => Ok(Some(Document {
            id: id.clone(),
            version: next_version,
            fields: fields.clone(),
        })),

        WriteOp::Update {
            collection,
            id,
            fields,
            expected_version,
        } => {
            if let Some(expected) = expected_version {
                let found = current.map(|doc| doc.version);
                if found != Some(*expected) {
                    return Err(Error::VersionConflict {
                        collection: collection.clone(),
                        id: id.clone(),
                        expected: *expected,
                        found,
                    });
                }
            }

            let doc = current.ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
            let mut merged = doc.fields.clone();
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }

            Ok(Some(Document {
                id: id.clone(),
                version: next_version,
                fields: merged,
            }))
        }

        WriteOp::Delete {
            collection,
            id,
            must_exist,
        } => {
            if *must_exist && current.is_none() {
                return Err(Error::NotFound(format!("{}/{}", collection, id)));
            }
            Ok(None)
        }
    }
}

/// Collection-oriented document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Run a query over one collection
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Apply all writes atomically, or none of them
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.commit(vec![WriteOp::set(collection, id, fields)]).await
    }

    /// Merge fields into an existing document (`NotFound` when absent)
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.commit(vec![WriteOp::update(collection, id, fields)]).await
    }

    /// Remove a document, returning whether it existed.
    ///
    /// The existence check runs inside the commit, so of two concurrent
    /// deletes of one document exactly one returns `true`.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        match self
            .commit(vec![WriteOp::delete_existing(collection, id)])
            .await
        {
            Ok(()) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Open the backend selected in the configuration
pub fn open(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::RocksDb => Arc::new(RocksStore::open(config)?),
    };

    tracing::info!(backend = store.backend(), "Document store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn doc(version: u64, value: Value) -> Document {
        Document {
            id: "d".into(),
            version,
            fields: fields(value),
        }
    }

    #[test]
    fn test_set_bumps_version() {
        let current = doc(3, json!({"a": 1}));
        let next = apply_op(Some(&current), &WriteOp::set("c", "d", fields(json!({"b": 2}))))
            .unwrap()
            .unwrap();
        assert_eq!(next.version, 4);
        assert!(next.fields.get("a").is_none());
    }

    #[test]
    fn test_update_merges_fields() {
        let current = doc(1, json!({"name": "Ada", "coins": 500}));
        let next = apply_op(
            Some(&current),
            &WriteOp::update("c", "d", fields(json!({"name": "Grace"}))),
        )
        .unwrap()
        .unwrap();
        assert_eq!(next.fields["name"], "Grace");
        assert_eq!(next.fields["coins"], 500);
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let result = apply_op(None, &WriteOp::update("c", "d", Fields::new()));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_version_mismatch() {
        let current = doc(2, json!({}));
        let result = apply_op(Some(&current), &WriteOp::update_if("c", "d", Fields::new(), 1));
        assert!(matches!(
            result,
            Err(Error::VersionConflict { expected: 1, found: Some(2), .. })
        ));
    }

    #[test]
    fn test_delete_existing_missing_is_not_found() {
        let result = apply_op(None, &WriteOp::delete_existing("c", "d"));
        assert!(matches!(result, Err(Error::NotFound(_))));

        assert_eq!(apply_op(None, &WriteOp::delete("c", "d")).unwrap(), None);

        let current = doc(1, json!({}));
        let result = apply_op(Some(&current), &WriteOp::delete_existing("c", "d")).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        assert!(encode(&5u32).is_err());
        assert_eq!(encode(&json!({"x": 1})).unwrap()["x"], 1);
    }
}
