//! Document store on RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account documents (key: account_id)
//! - `pizza_history` - Consumption records (key: record_id)
//! - `leaderboard` - Materialized ranking (key: account_id)
//! - `history_by_user` - Index (key: userId || 0x00 || record_id, empty value)
//!
//! Values are JSON-encoded [`Document`]s, version included. The history
//! index is written in the same batch as the records it points to.

use super::{apply_op, Document, DocumentStore, Query, WriteOp};
use crate::{
    error::{Error, Result},
    types::{ACCOUNTS, HISTORY, LEADERBOARD},
    Config,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashMap;
use std::sync::Arc;

/// Column family names
const COLLECTIONS: [&str; 3] = [ACCOUNTS, HISTORY, LEADERBOARD];

/// History records by owner
const CF_HISTORY_BY_USER: &str = "history_by_user";

/// Indexed field of history records
const HISTORY_USER_FIELD: &str = "userId";

/// Storage wrapper for RocksDB
pub struct RocksStore {
    db: Arc<DB>,
    /// Single writer: commits validate and write under this lock
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        let tuning = &config.store.rocksdb;
        db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
        db_opts.set_max_background_jobs(tuning.max_background_jobs);

        if tuning.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors: Vec<_> = COLLECTIONS
            .iter()
            .chain(std::iter::once(&CF_HISTORY_BY_USER))
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            COLLECTIONS
                .iter()
                .filter(|name| db.cf_handle(name).is_some())
                .count()
        );

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        if name == HISTORY {
            // Append-only and rarely re-read
            opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        } else {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn read(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let cf = self.cf_handle(collection)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// History records of one user, read through the index
    fn scan_history_of(&self, user_id: &str) -> Result<Vec<Document>> {
        let cf_index = self.cf_handle(CF_HISTORY_BY_USER)?;
        let prefix = Self::index_key_user_history(user_id, None);

        let mut docs = Vec::new();
        for item in self.db.prefix_iterator_cf(cf_index, &prefix) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let record_id = String::from_utf8_lossy(&key[prefix.len()..]);
            match self.read(HISTORY, &record_id)? {
                Some(doc) => docs.push(doc),
                None => tracing::warn!(user_id, %record_id, "Dangling history index entry"),
            }
        }
        Ok(docs)
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        let cf = self.cf_handle(collection)?;
        let mut docs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            docs.push(serde_json::from_slice(&value)?);
        }
        Ok(docs)
    }

    fn commit_sync(&self, ops: &[WriteOp]) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut staged: HashMap<(String, String), Option<Document>> = HashMap::new();
        let mut stored: HashMap<(String, String), Option<Document>> = HashMap::new();
        let mut order = Vec::new();

        for op in ops {
            let (collection, id) = op.target();
            let key = (collection.to_string(), id.to_string());

            let current = match staged.get(&key) {
                Some(doc) => doc.clone(),
                None => {
                    let doc = self.read(&key.0, &key.1)?;
                    stored.insert(key.clone(), doc.clone());
                    doc
                }
            };
            let next = apply_op(current.as_ref(), op)?;

            if !staged.contains_key(&key) {
                order.push(key.clone());
            }
            staged.insert(key, next);
        }

        let mut batch = WriteBatch::default();
        for key in order {
            let cf = self.cf_handle(&key.0)?;
            let next = staged.remove(&key).flatten();

            if key.0 == HISTORY {
                let before = stored.remove(&key).flatten();
                self.reindex_history(&mut batch, &key.1, before.as_ref(), next.as_ref())?;
            }

            match next {
                Some(doc) => batch.put_cf(cf, key.1.as_bytes(), serde_json::to_vec(&doc)?),
                None => batch.delete_cf(cf, key.1.as_bytes()),
            }
        }

        // Atomic commit
        self.db.write(batch)?;
        Ok(())
    }

    fn reindex_history(
        &self,
        batch: &mut WriteBatch,
        record_id: &str,
        before: Option<&Document>,
        after: Option<&Document>,
    ) -> Result<()> {
        let cf_index = self.cf_handle(CF_HISTORY_BY_USER)?;
        let owner = |doc: Option<&Document>| {
            doc.and_then(|d| d.fields.get(HISTORY_USER_FIELD))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let (old_owner, new_owner) = (owner(before), owner(after));
        if old_owner == new_owner {
            return Ok(());
        }
        if let Some(user_id) = old_owner {
            batch.delete_cf(cf_index, Self::index_key_user_history(&user_id, Some(record_id)));
        }
        if let Some(user_id) = new_owner {
            batch.put_cf(cf_index, Self::index_key_user_history(&user_id, Some(record_id)), b"");
        }
        Ok(())
    }

    // Index key helpers

    fn index_key_user_history(user_id: &str, record_id: Option<&str>) -> Vec<u8> {
        let mut key = user_id.as_bytes().to_vec();
        key.push(0); // Separator
        if let Some(rid) = record_id {
            key.extend_from_slice(rid.as_bytes());
        }
        key
    }
}

#[async_trait]
impl DocumentStore for RocksStore {
    fn backend(&self) -> &'static str {
        "rocksdb"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.read(collection, id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let indexed_user = match &query.filter {
            Some(filter) if collection == HISTORY && filter.field == HISTORY_USER_FIELD => {
                filter.value.as_str()
            }
            _ => None,
        };

        let docs = match indexed_user {
            Some(user_id) => self.scan_history_of(user_id)?,
            None => self.scan(collection)?,
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
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (RocksStore::open(&config).unwrap(), temp_dir)
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_storage_open() {
        let (store, _temp) = test_store();
        for name in COLLECTIONS {
            assert!(store.db.cf_handle(name).is_some());
        }
        assert!(store.db.cf_handle(CF_HISTORY_BY_USER).is_some());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = test_store();
        store
            .set(ACCOUNTS, "a", fields(json!({"name": "Ada", "coins": 500})))
            .await
            .unwrap();

        let doc = store.get(ACCOUNTS, "a").await.unwrap().unwrap();
        assert_eq!(doc.id, "a");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.fields["name"], "Ada");
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let (store, _temp) = test_store();
        let err = store.get("payments", "a").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_atomic_commit_rolls_back_on_conflict() {
        let (store, _temp) = test_store();
        store.set(ACCOUNTS, "a", fields(json!({"pizzaSlices": 1}))).await.unwrap();

        let result = store
            .commit(vec![
                WriteOp::update_if(ACCOUNTS, "a", fields(json!({"pizzaSlices": 0})), 1),
                WriteOp::set(HISTORY, "h1", fields(json!({"userId": "a"}))),
                WriteOp::update_if(ACCOUNTS, "a", fields(json!({"pizzaSlices": 0})), 1),
            ])
            .await;

        // Second CAS sees version 2 from the first op in the same commit
        assert!(matches!(result, Err(Error::VersionConflict { .. })));
        assert!(store.get(HISTORY, "h1").await.unwrap().is_none());
        let doc = store.get(ACCOUNTS, "a").await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
    }

    #[tokio::test]
    async fn test_query_and_delete() {
        let (store, _temp) = test_store();
        for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
            store.set(LEADERBOARD, id, fields(json!({"rank": n}))).await.unwrap();
        }
        assert!(store.delete(LEADERBOARD, "b").await.unwrap());

        let docs = store
            .query(LEADERBOARD, &Query::new().order_by("rank", Direction::Ascending).limit(5))
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_history_query_uses_user_index() {
        let (store, _temp) = test_store();
        let records = [("h1", "ada", 1), ("h2", "bob", 2), ("h3", "ada", 3), ("h4", "ad", 4)];
        for (id, user, ts) in records {
            store
                .set(HISTORY, id, fields(json!({"userId": user, "timestampNanos": ts})))
                .await
                .unwrap();
        }

        let cf_index = store.cf_handle(CF_HISTORY_BY_USER).unwrap();
        let index_keys = store.db.iterator_cf(cf_index, IteratorMode::Start).count();
        assert_eq!(index_keys, 4);

        let query = Query::new()
            .where_eq("userId", "ada")
            .order_by("timestampNanos", Direction::Descending);
        let ids: Vec<_> = store
            .query(HISTORY, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["h3", "h1"]);

        // Reassigning and deleting records moves their index entries
        store
            .set(HISTORY, "h1", fields(json!({"userId": "bob", "timestampNanos": 1})))
            .await
            .unwrap();
        assert!(store.delete(HISTORY, "h3").await.unwrap());

        assert!(store.query(HISTORY, &query).await.unwrap().is_empty());
        let bob = store
            .query(HISTORY, &Query::new().where_eq("userId", "bob"))
            .await
            .unwrap();
        assert_eq!(bob.len(), 2);
        assert_eq!(store.db.iterator_cf(cf_index, IteratorMode::Start).count(), 3);
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        {
            let store = RocksStore::open(&config).unwrap();
            store.set(ACCOUNTS, "a", fields(json!({"coins": 490}))).await.unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        let doc = store.get(ACCOUNTS, "a").await.unwrap().unwrap();
        assert_eq!(doc.fields["coins"], 490);
    }
}
