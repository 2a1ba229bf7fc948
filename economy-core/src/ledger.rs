//! Account ledger orchestration layer
//!
//! This module ties together the document store, history log and ranking
//! engine into the operations exposed to the request layer.
//!
//! # Example
//!
//! ```no_run
//! use economy_core::{Config, Ledger, Profile};
//!
//! #[tokio::main]
//! async fn main() -> economy_core::Result<()> {
//!     let ledger = Ledger::open(Config::in_memory()).await?;
//!
//!     let account = ledger.create_account(Profile::new("Ada", 36, "f")).await?;
//!     ledger.purchase(&account.id).await?;
//!     ledger.consume(&account.id).await?;
//!
//!     let top = ledger.top(10).await?;
//!     assert_eq!(top[0].account_id, account.id);
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! Purchase and Consume read the account with its version, apply the
//! transition to a copy and commit it with a compare-and-swap on that
//! version. A concurrent writer makes the commit fail with a version
//! conflict and the transition is re-run on fresh state, so two purchases
//! can never both spend the same coins.

use crate::{
    config::RebuildFailurePolicy,
    history::{HistoryLog, HistoryQuery},
    leaderboard::Leaderboard,
    metrics::Metrics,
    ranking::{load_accounts, FullRebuild, RankingEngine, RankingStrategy},
    store::{self, encode, DocumentStore, Fields, WriteOp},
    types::{
        Account, AccountId, ConsumeReceipt, LeaderboardEntry, LeaderboardStatus, Profile,
        RebuildReport, ACCOUNTS,
    },
    Config, Error, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Main ledger interface
pub struct Ledger {
    /// Injected document store
    store: Arc<dyn DocumentStore>,

    /// Consumption history
    history: HistoryLog,

    /// Ranking engine (rebuild side of the leaderboard)
    ranking: RankingEngine,

    /// Leaderboard reader
    leaderboard: Leaderboard,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open the configured store and build the ledger on it
    pub async fn open(config: Config) -> Result<Self> {
        let store = store::open(&config)?;
        Self::with_store(store, config)
    }

    /// Build on an existing store with the default ranking strategy
    pub fn with_store(store: Arc<dyn DocumentStore>, config: Config) -> Result<Self> {
        Self::with_strategy(store, config, Arc::new(FullRebuild))
    }

    /// Build on an existing store with a custom ranking strategy
    pub fn with_strategy(
        store: Arc<dyn DocumentStore>,
        config: Config,
        strategy: Arc<dyn RankingStrategy>,
    ) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Other(format!("metrics: {}", e)))?;

        Ok(Self {
            history: HistoryLog::new(store.clone()),
            ranking: RankingEngine::new(store.clone(), strategy, metrics.clone()),
            leaderboard: Leaderboard::new(store.clone(), config.leaderboard.default_top_n),
            store,
            metrics,
            config,
        })
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Accounts

    /// Create an account with the fixed starting economy
    pub async fn create_account(&self, profile: Profile) -> Result<Account> {
        let account = Account::open(AccountId::generate(), profile);
        self.store
            .set(ACCOUNTS, account.id.as_str(), encode(&account)?)
            .await?;

        self.metrics.accounts_created.inc();
        tracing::info!(account_id = %account.id, name = %account.name, "Account created");
        Ok(account)
    }

    /// Fetch one account
    pub async fn get_account(&self, id: &AccountId) -> Result<Account> {
        let doc = self
            .store
            .get(ACCOUNTS, id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut account: Account = doc.decode()?;
        account.id = id.clone();
        Ok(account)
    }

    /// All accounts, unordered
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        load_accounts(self.store.as_ref()).await
    }

    /// Replace name, age and gender; economy fields are untouched
    pub async fn update_profile(&self, id: &AccountId, profile: Profile) -> Result<()> {
        match self.store.update(ACCOUNTS, id.as_str(), encode(&profile)?).await {
            Ok(()) => {
                tracing::info!(account_id = %id, "Profile updated");
                Ok(())
            }
            Err(Error::NotFound(_)) => Err(Error::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Remove the account record. History and leaderboard entries are kept;
    /// the next rebuild drops the leaderboard entry.
    pub async fn delete_account(&self, id: &AccountId) -> Result<()> {
        if !self.store.delete(ACCOUNTS, id.as_str()).await? {
            return Err(Error::NotFound(id.to_string()));
        }

        self.metrics.accounts_deleted.inc();
        tracing::info!(account_id = %id, "Account deleted");
        Ok(())
    }

    // Transitions

    /// Buy one slice for `SLICE_PRICE` coins
    pub async fn purchase(&self, id: &AccountId) -> Result<Account> {
        let account = self
            .transact("purchase", id, |account| {
                account.buy_slice()?;
                Ok(Vec::new())
            })
            .await?;

        self.metrics.purchases_total.inc();
        tracing::debug!(
            account_id = %id,
            coins = account.coins,
            pizza_slices = account.pizza_slices,
            "Slice purchased"
        );
        Ok(account)
    }

    /// Eat one slice, log it and refresh the leaderboard
    pub async fn consume(&self, id: &AccountId) -> Result<ConsumeReceipt> {
        let mut record_id = None;
        let account = self
            .transact("consume", id, |account| {
                account.eat_slice()?;
                let (rid, op) = HistoryLog::record_op(&account.id, Utc::now())?;
                record_id = Some(rid);
                Ok(vec![op])
            })
            .await?;
        let record_id =
            record_id.ok_or_else(|| Error::Other("consume committed without a record".into()))?;

        self.metrics.consumptions_total.inc();
        tracing::debug!(
            account_id = %id,
            pizza_slices = account.pizza_slices,
            pizzas_eaten = account.pizzas_eaten,
            record_id = %record_id,
            "Slice consumed"
        );

        // The counter change is committed; a failed rebuild does not undo it
        let leaderboard = match self.ranking.on_consumed(&account).await {
            Ok(_) => LeaderboardStatus::Fresh,
            Err(e) => match self.config.ledger.rebuild_failure {
                RebuildFailurePolicy::Propagate => {
                    tracing::warn!(account_id = %id, error = %e, "Leaderboard rebuild failed");
                    return Err(e);
                }
                RebuildFailurePolicy::Defer => {
                    tracing::warn!(
                        account_id = %id,
                        error = %e,
                        "Leaderboard rebuild failed, view is stale until the next rebuild"
                    );
                    LeaderboardStatus::Stale
                }
            },
        };

        Ok(ConsumeReceipt {
            account,
            record_id,
            leaderboard,
        })
    }

    /// Optimistic read-check-write on one account.
    ///
    /// `transition` mutates a fresh copy and returns extra writes that must
    /// land in the same commit. Its errors abort without writing anything.
    async fn transact<F>(
        &self,
        operation: &'static str,
        id: &AccountId,
        mut transition: F,
    ) -> Result<Account>
    where
        F: FnMut(&mut Account) -> Result<Vec<WriteOp>> + Send,
    {
        let attempts = self.config.ledger.max_transaction_retries.max(1);

        for attempt in 1..=attempts {
            let doc = match self.store.get(ACCOUNTS, id.as_str()).await? {
                Some(doc) => doc,
                None => return Err(self.reject(operation, Error::NotFound(id.to_string()))),
            };
            let mut account: Account = doc.decode()?;
            account.id = id.clone();

            let extra = match transition(&mut account) {
                Ok(ops) => ops,
                Err(e) => return Err(self.reject(operation, e)),
            };

            let mut ops = Vec::with_capacity(extra.len() + 1);
            ops.push(WriteOp::update_if(
                ACCOUNTS,
                id.as_str(),
                economy_fields(&account),
                doc.version,
            ));
            ops.extend(extra);

            match self.store.commit(ops).await {
                Ok(()) => return Ok(account),
                Err(Error::VersionConflict { found, .. }) => {
                    self.metrics.transaction_conflicts.inc();
                    tracing::debug!(
                        account_id = %id,
                        operation,
                        attempt,
                        read_version = doc.version,
                        found_version = ?found,
                        "Concurrent write, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(account_id = %id, operation, attempts, "Transaction retries exhausted");
        Err(self.reject(
            operation,
            Error::Contention(format!(
                "{} on account {} after {} attempts",
                operation, id, attempts
            )),
        ))
    }

    fn reject(&self, operation: &str, error: Error) -> Error {
        self.metrics.record_rejection(operation, &error);
        error
    }

    // History

    /// Consumption records of one account, newest first
    pub fn history(&self, id: &AccountId) -> HistoryQuery {
        self.history.query(id)
    }

    // Leaderboard

    /// Recompute the leaderboard now
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        self.ranking.rebuild().await
    }

    /// True while the last rebuild attempt failed
    pub fn is_leaderboard_stale(&self) -> bool {
        self.ranking.is_stale()
    }

    /// First `n` leaderboard entries
    pub async fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>> {
        self.leaderboard.top(n).await
    }

    /// First `leaderboard.default_top_n` entries
    pub async fn top_default(&self) -> Result<Vec<LeaderboardEntry>> {
        self.leaderboard.top_default().await
    }

    /// Materialized entry of one account
    pub async fn rank_of(&self, id: &AccountId) -> Result<Option<LeaderboardEntry>> {
        self.leaderboard.entry(id).await
    }
}

/// Partial body carrying only the ledger-owned fields
fn economy_fields(account: &Account) -> Fields {
    let mut fields = Fields::new();
    fields.insert("coins".to_string(), account.coins.into());
    fields.insert("pizzaSlices".to_string(), account.pizza_slices.into());
    fields.insert("pizzasEaten".to_string(), account.pizzas_eaten.into());
    fields
}
