//! Read side of the materialized leaderboard
//!
//! Reads never recompute ranks; they return whatever the last rebuild wrote.

use crate::{
    store::{Direction, DocumentStore, Query},
    types::{AccountId, LeaderboardEntry, LEADERBOARD},
    Result,
};
use std::sync::Arc;

/// Leaderboard reader
#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn DocumentStore>,
    default_top_n: usize,
}

impl Leaderboard {
    /// Create over a store
    pub fn new(store: Arc<dyn DocumentStore>, default_top_n: usize) -> Self {
        Self {
            store,
            default_top_n,
        }
    }

    /// First `n` entries by ascending rank
    pub async fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let query = Query::new().order_by("rank", Direction::Ascending).limit(n);
        self.store
            .query(LEADERBOARD, &query)
            .await?
            .iter()
            .map(|doc| doc.decode())
            .collect()
    }

    /// `top` with the configured default size
    pub async fn top_default(&self) -> Result<Vec<LeaderboardEntry>> {
        self.top(self.default_top_n).await
    }

    /// Materialized entry of one account, if it has been ranked
    pub async fn entry(&self, account_id: &AccountId) -> Result<Option<LeaderboardEntry>> {
        match self.store.get(LEADERBOARD, account_id.as_str()).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}
