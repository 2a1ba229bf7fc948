//! Leaderboard ranking engine
//!
//! The engine owns the `leaderboard` collection as a write target and
//! treats accounts as read-only input. How ranks are computed is behind
//! [`RankingStrategy`]; the default [`FullRebuild`] re-ranks every account
//! on every call.
//!
//! # Ordering
//!
//! `pizzasEaten` descending, then account ID ascending. Rank is the 1-based
//! position in that order, so ranks are always `1..=N` without gaps or
//! shared positions.
//!
//! # Consistency
//!
//! Entries are written one by one. Two rebuilds running at the same time
//! may interleave their writes; each entry ends up with whichever write
//! landed last, and the view converges once a rebuild runs alone.

use crate::{
    metrics::Metrics,
    store::{encode, DocumentStore, Query},
    types::{Account, AccountId, LeaderboardEntry, RebuildReport, ACCOUNTS, LEADERBOARD},
    Result,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot of the fields ranking needs from one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInput {
    /// Account
    pub account_id: AccountId,
    /// Name at snapshot time
    pub name: String,
    /// Counter at snapshot time
    pub pizzas_eaten: u64,
}

impl From<&Account> for RankInput {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id.clone(),
            name: account.name.clone(),
            pizzas_eaten: account.pizzas_eaten,
        }
    }
}

/// Sort a snapshot and assign dense 1-based ranks
pub fn assign_ranks(mut inputs: Vec<RankInput>) -> Vec<LeaderboardEntry> {
    inputs.sort_by(|a, b| {
        b.pizzas_eaten
            .cmp(&a.pizzas_eaten)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });

    inputs
        .into_iter()
        .enumerate()
        .map(|(position, input)| LeaderboardEntry {
            account_id: input.account_id,
            name: input.name,
            pizzas_eaten: input.pizzas_eaten,
            rank: position as u64 + 1,
        })
        .collect()
}

/// Read every live account
pub async fn load_accounts(store: &dyn DocumentStore) -> Result<Vec<Account>> {
    store
        .query(ACCOUNTS, &Query::new())
        .await?
        .into_iter()
        .map(|doc| {
            let mut account: Account = doc.decode()?;
            account.id = AccountId::new(doc.id);
            Ok(account)
        })
        .collect()
}

/// Pluggable ranking algorithm
#[async_trait]
pub trait RankingStrategy: Send + Sync {
    /// Strategy name for logs and reports
    fn name(&self) -> &'static str;

    /// Recompute the whole leaderboard
    async fn rebuild(&self, store: &dyn DocumentStore) -> Result<RebuildReport>;

    /// React to one committed consumption. Incremental strategies override
    /// this; the default recomputes everything.
    async fn on_consumed(
        &self,
        store: &dyn DocumentStore,
        _account: &Account,
    ) -> Result<RebuildReport> {
        self.rebuild(store).await
    }
}

/// Linear full recompute over all accounts
#[derive(Debug, Clone, Copy, Default)]
pub struct FullRebuild;

#[async_trait]
impl RankingStrategy for FullRebuild {
    fn name(&self) -> &'static str {
        "full-rebuild"
    }

    async fn rebuild(&self, store: &dyn DocumentStore) -> Result<RebuildReport> {
        let accounts = load_accounts(store).await?;
        let entries = assign_ranks(accounts.iter().map(RankInput::from).collect());

        let live: HashSet<&str> = entries.iter().map(|e| e.account_id.as_str()).collect();
        for entry in &entries {
            store
                .set(LEADERBOARD, entry.account_id.as_str(), encode(entry)?)
                .await?;
        }

        // Entries of deleted accounts are dropped here, not at delete time
        let mut pruned = 0;
        for doc in store.query(LEADERBOARD, &Query::new()).await? {
            if !live.contains(doc.id.as_str()) && store.delete(LEADERBOARD, &doc.id).await? {
                pruned += 1;
            }
        }

        Ok(RebuildReport {
            ranked: entries.len(),
            pruned,
            strategy: self.name(),
        })
    }
}

/// Runs the strategy and tracks whether the materialized view is stale
pub struct RankingEngine {
    store: Arc<dyn DocumentStore>,
    strategy: Arc<dyn RankingStrategy>,
    metrics: Metrics,
    stale: AtomicBool,
}

impl RankingEngine {
    /// Create with an explicit strategy
    pub fn new(
        store: Arc<dyn DocumentStore>,
        strategy: Arc<dyn RankingStrategy>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            strategy,
            metrics,
            stale: AtomicBool::new(false),
        }
    }

    /// True after a failed rebuild until the next successful one
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Full recompute
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let started = Instant::now();
        let result = self.strategy.rebuild(self.store.as_ref()).await;
        self.finish(result, started)
    }

    /// Ranking update after a committed consumption
    pub async fn on_consumed(&self, account: &Account) -> Result<RebuildReport> {
        let started = Instant::now();
        let result = self.strategy.on_consumed(self.store.as_ref(), account).await;
        self.finish(result, started)
    }

    fn finish(&self, result: Result<RebuildReport>, started: Instant) -> Result<RebuildReport> {
        match result {
            Ok(report) => {
                self.stale.store(false, Ordering::Release);
                self.metrics
                    .record_rebuild(report.ranked, started.elapsed().as_secs_f64());
                tracing::info!(
                    strategy = report.strategy,
                    ranked = report.ranked,
                    pruned = report.pruned,
                    "Leaderboard rebuilt"
                );
                Ok(report)
            }
            Err(e) => {
                self.stale.store(true, Ordering::Release);
                self.metrics.record_rebuild_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Profile;

    fn input(id: &str, eaten: u64) -> RankInput {
        RankInput {
            account_id: AccountId::new(id),
            name: id.to_uppercase(),
            pizzas_eaten: eaten,
        }
    }

    async fn seed(store: &dyn DocumentStore, id: &str, eaten: u64) {
        let mut account = Account::open(AccountId::new(id), Profile::new(id, 20, "x"));
        account.pizzas_eaten = eaten;
        store.set(ACCOUNTS, id, encode(&account).unwrap()).await.unwrap();
    }

    #[test]
    fn test_higher_count_ranks_first() {
        let ranked = assign_ranks(vec![input("a", 3), input("b", 5)]);
        assert_eq!(ranked[0].account_id, AccountId::new("b"));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].account_id, AccountId::new("a"));
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_ties_break_by_account_id() {
        let ranked = assign_ranks(vec![input("c", 2), input("a", 2), input("b", 7), input("d", 0)]);
        let order: Vec<_> = ranked.iter().map(|e| e.account_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "d"]);
        let ranks: Vec<_> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(assign_ranks(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_full_rebuild_materializes_entries() {
        let store = MemoryStore::new();
        seed(&store, "a", 3).await;
        seed(&store, "b", 5).await;

        let report = FullRebuild.rebuild(&store).await.unwrap();
        assert_eq!(report.ranked, 2);
        assert_eq!(report.pruned, 0);

        let doc = store.get(LEADERBOARD, "b").await.unwrap().unwrap();
        let entry: LeaderboardEntry = doc.decode().unwrap();
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.pizzas_eaten, 5);
        assert_eq!(entry.name, "b");
    }

    #[tokio::test]
    async fn test_rebuild_prunes_deleted_accounts() {
        let store = MemoryStore::new();
        seed(&store, "a", 1).await;
        seed(&store, "b", 2).await;
        FullRebuild.rebuild(&store).await.unwrap();

        store.delete(ACCOUNTS, "b").await.unwrap();
        // Stale until the next rebuild
        assert!(store.get(LEADERBOARD, "b").await.unwrap().is_some());

        let report = FullRebuild.rebuild(&store).await.unwrap();
        assert_eq!(report.pruned, 1);
        assert!(store.get(LEADERBOARD, "b").await.unwrap().is_none());

        let entry: LeaderboardEntry = store
            .get(LEADERBOARD, "a")
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(entry.rank, 1);
    }

    #[tokio::test]
    async fn test_engine_records_metrics() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        seed(store.as_ref(), "a", 1).await;

        let metrics = Metrics::new().unwrap();
        let engine = RankingEngine::new(store, Arc::new(FullRebuild), metrics.clone());

        engine.rebuild().await.unwrap();
        assert!(!engine.is_stale());
        assert_eq!(metrics.rebuilds_total.get(), 1);
        assert_eq!(metrics.leaderboard_entries.get(), 1);
    }
}
