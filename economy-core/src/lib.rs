//! Pizza Economy Core
//!
//! Account ledger and leaderboard ranking engine for a small virtual
//! economy: coins buy pizza slices, eating a slice bumps a lifetime counter,
//! and the counters are ranked into a materialized leaderboard.
//!
//! # Architecture
//!
//! - **Document store**: injected [`store::DocumentStore`], RocksDB or in-memory
//! - **Optimistic transactions**: per-account compare-and-swap, no lost updates
//! - **History log**: append-only consumption records
//! - **Ranking engine**: pluggable strategy, full rebuild by default
//!
//! # Invariants
//!
//! - `coins`, `pizzaSlices`, `pizzasEaten` never go below zero
//! - Purchase and Consume are all-or-nothing
//! - After a successful rebuild ranks are exactly `1..=N` over live accounts

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod history;
pub mod leaderboard;
pub mod ledger;
pub mod metrics;
pub mod ranking;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use ranking::{FullRebuild, RankingStrategy};
pub use types::{
    Account, AccountId, ConsumeReceipt, HistoryRecord, LeaderboardEntry, LeaderboardStatus,
    Profile, RebuildReport, RecordId, DEFAULT_TOP_N, SLICE_PRICE, STARTING_COINS,
};
