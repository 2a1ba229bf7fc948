//! Append-only consumption history
//!
//! Records are never updated or deleted here. A [`HistoryQuery`] is only a
//! description: every [`HistoryQuery::fetch`] runs it again against the
//! store, so callers can re-read without rebuilding the query.

use crate::{
    store::{encode, Direction, DocumentStore, Query, WriteOp},
    types::{AccountId, HistoryRecord, RecordId, HISTORY},
    Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// History log over the `pizza_history` collection
#[derive(Clone)]
pub struct HistoryLog {
    store: Arc<dyn DocumentStore>,
}

impl HistoryLog {
    /// Create over a store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Build the write for a new record without committing it, so callers
    /// can put it in the same commit as a ledger mutation
    pub fn record_op(
        account_id: &AccountId,
        timestamp: DateTime<Utc>,
    ) -> Result<(RecordId, WriteOp)> {
        let record = HistoryRecord {
            id: RecordId::generate(),
            account_id: account_id.clone(),
            timestamp_nanos: timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX),
        };
        let op = WriteOp::set(HISTORY, record.id.as_str(), encode(&record)?);
        Ok((record.id, op))
    }

    /// Append a record on its own
    pub async fn append(
        &self,
        account_id: &AccountId,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordId> {
        let (id, op) = Self::record_op(account_id, timestamp)?;
        self.store.commit(vec![op]).await?;

        tracing::debug!(record_id = %id, account_id = %account_id, "History record appended");
        Ok(id)
    }

    /// Records of one account, newest first
    pub fn query(&self, account_id: &AccountId) -> HistoryQuery {
        HistoryQuery {
            store: self.store.clone(),
            account_id: account_id.clone(),
        }
    }
}

/// Restartable history query
#[derive(Clone)]
pub struct HistoryQuery {
    store: Arc<dyn DocumentStore>,
    account_id: AccountId,
}

impl HistoryQuery {
    /// Execute the query
    pub async fn fetch(&self) -> Result<Vec<HistoryRecord>> {
        let query = Query::new()
            .where_eq("userId", self.account_id.as_str())
            .order_by("timestampNanos", Direction::Descending);

        self.store
            .query(HISTORY, &query)
            .await?
            .into_iter()
            .map(|doc| {
                let mut record: HistoryRecord = doc.decode()?;
                record.id = RecordId::new(doc.id);
                Ok(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_query_newest_first() {
        let log = HistoryLog::new(Arc::new(MemoryStore::new()));
        let account = AccountId::new("u1");
        let base = Utc::now();

        let old = log.append(&account, base - Duration::seconds(60)).await.unwrap();
        let new = log.append(&account, base).await.unwrap();
        log.append(&AccountId::new("u2"), base).await.unwrap();

        let records = log.query(&account).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, new);
        assert_eq!(records[1].id, old);
        assert!(records.iter().all(|r| r.account_id == account));
    }

    #[tokio::test]
    async fn test_query_is_restartable() {
        let log = HistoryLog::new(Arc::new(MemoryStore::new()));
        let account = AccountId::new("u1");
        let query = log.query(&account);

        assert!(query.fetch().await.unwrap().is_empty());

        log.append(&account, Utc::now()).await.unwrap();
        assert_eq!(query.fetch().await.unwrap().len(), 1);
        assert_eq!(query.fetch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_roundtrip() {
        let log = HistoryLog::new(Arc::new(MemoryStore::new()));
        let account = AccountId::new("u1");
        let at = Utc::now();

        log.append(&account, at).await.unwrap();
        let records = log.query(&account).fetch().await.unwrap();
        assert_eq!(records[0].timestamp(), at);
    }
}
