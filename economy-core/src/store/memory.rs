//! In-process document store

use super::{apply_op, Document, DocumentStore, Query, WriteOp};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

type Key = (String, String);

/// Document store backed by concurrent hash maps.
///
/// Commits are validated in full before anything is written, then
/// published under the write side of one lock. Reads take the read side,
/// so they never observe half of a commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Document>>,
    commit_lock: RwLock<()>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id).map(|doc| doc.clone()))
    }

    fn commit_sync(&self, ops: &[WriteOp]) -> Result<()> {
        let _guard = self.commit_lock.write();

        // Stage every op first; later ops see earlier ones in the same commit
        let mut staged: HashMap<Key, Option<Document>> = HashMap::new();
        let mut order: Vec<Key> = Vec::new();

        for op in ops {
            let (collection, id) = op.target();
            let key = (collection.to_string(), id.to_string());

            let current = match staged.get(&key) {
                Some(doc) => doc.clone(),
                None => self.current(&key.0, &key.1),
            };
            let next = apply_op(current.as_ref(), op)?;

            if !staged.contains_key(&key) {
                order.push(key.clone());
            }
            staged.insert(key, next);
        }

        for key in order {
            let (collection, id) = key.clone();
            match staged.remove(&key).flatten() {
                Some(doc) => {
                    self.collections
                        .entry(collection)
                        .or_default()
                        .insert(id, doc);
                }
                None => {
                    if let Some(docs) = self.collections.get(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let _guard = self.commit_lock.read();
        Ok(self.current(collection, id))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let docs: Vec<Document> = {
            let _guard = self.commit_lock.read();
            match self.collections.get(collection) {
                Some(docs) => docs.iter().map(|entry| entry.value().clone()).collect(),
                None => Vec::new(),
            }
        };
        Ok(query.run(docs))
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.commit_sync(&ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, Fields};
    use crate::Error;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("accounts", "a", fields(json!({"coins": 500}))).await.unwrap();

        let doc = store.get("accounts", "a").await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.fields["coins"], 500);

        assert!(store.delete("accounts", "a").await.unwrap());
        assert!(!store.delete("accounts", "a").await.unwrap());
        assert!(store.get("accounts", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = MemoryStore::new();
        let err = store.update("accounts", "nope", Fields::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        store.set("accounts", "a", fields(json!({"coins": 500}))).await.unwrap();

        let result = store
            .commit(vec![
                WriteOp::set("history", "h1", fields(json!({"userId": "a"}))),
                WriteOp::update_if("accounts", "a", fields(json!({"coins": 490})), 7),
            ])
            .await;

        assert!(matches!(result, Err(Error::VersionConflict { .. })));
        assert!(store.get("history", "h1").await.unwrap().is_none());
        let doc = store.get("accounts", "a").await.unwrap().unwrap();
        assert_eq!(doc.fields["coins"], 500);
        assert_eq!(doc.version, 1);
    }

    #[tokio::test]
    async fn test_query_ordering() {
        let store = MemoryStore::new();
        for (id, n) in [("a", 3), ("b", 5), ("c", 1)] {
            store.set("users", id, fields(json!({"n": n}))).await.unwrap();
        }

        let docs = store
            .query("users", &Query::new().order_by("n", Direction::Descending))
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        assert!(store.query("missing", &Query::new()).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queries_never_see_half_a_commit() {
        let store = std::sync::Arc::new(MemoryStore::new());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    store
                        .commit(vec![
                            WriteOp::set("pairs", format!("{}-a", i), fields(json!({"i": i}))),
                            WriteOp::set("pairs", format!("{}-b", i), fields(json!({"i": i}))),
                        ])
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let docs = store.query("pairs", &Query::new()).await.unwrap();
                    assert_eq!(docs.len() % 2, 0, "saw {} documents", docs.len());
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(store.query("pairs", &Query::new()).await.unwrap().len(), 400);
    }

    #[tokio::test]
    async fn test_commit_same_document_twice() {
        let store = MemoryStore::new();
        store
            .commit(vec![
                WriteOp::set("c", "x", fields(json!({"a": 1}))),
                WriteOp::update("c", "x", fields(json!({"b": 2}))),
            ])
            .await
            .unwrap();

        let doc = store.get("c", "x").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.fields["a"], 1);
        assert_eq!(doc.fields["b"], 2);
    }
}
