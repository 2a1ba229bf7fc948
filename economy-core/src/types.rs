//! Core types for the economy
//!
//! Stored field names keep the document layout used by the client apps
//! (`pizzaSlices`, `pizzasEaten`, `userId`), so the structs rename to
//! camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Price of one pizza slice, in coins
pub const SLICE_PRICE: u64 = 10;

/// Balance every new account starts with
pub const STARTING_COINS: u64 = 500;

/// Leaderboard size when the caller does not ask for one
pub const DEFAULT_TOP_N: usize = 10;

/// Account collection name
pub const ACCOUNTS: &str = "accounts";

/// Consumption history collection name
pub const HISTORY: &str = "pizza_history";

/// Materialized leaderboard collection name
pub const LEADERBOARD: &str = "leaderboard";

/// Account identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// History record identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create new record ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-editable part of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub name: String,
    /// Age in years
    pub age: u32,
    /// Free-form gender
    pub gender: String,
}

impl Profile {
    /// Build a profile
    pub fn new(name: impl Into<String>, age: u32, gender: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            gender: gender.into(),
        }
    }
}

/// Account with its economy state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Document ID (not stored inside the document body)
    #[serde(skip)]
    pub id: AccountId,

    /// Display name
    pub name: String,

    /// Age in years
    pub age: u32,

    /// Free-form gender
    pub gender: String,

    /// Spendable balance
    pub coins: u64,

    /// Slices bought but not yet eaten
    pub pizza_slices: u64,

    /// Lifetime slices eaten
    pub pizzas_eaten: u64,
}

impl Account {
    /// New account with the fixed starting economy
    pub fn open(id: AccountId, profile: Profile) -> Self {
        Self {
            id,
            name: profile.name,
            age: profile.age,
            gender: profile.gender,
            coins: STARTING_COINS,
            pizza_slices: 0,
            pizzas_eaten: 0,
        }
    }

    /// Purchase transition: `coins -= SLICE_PRICE; pizzaSlices += 1`
    ///
    /// Leaves `self` untouched on failure.
    pub fn buy_slice(&mut self) -> crate::Result<()> {
        let coins = self
            .coins
            .checked_sub(SLICE_PRICE)
            .ok_or_else(|| crate::Error::InsufficientFunds {
                account: self.id.to_string(),
                coins: self.coins,
                price: SLICE_PRICE,
            })?;
        let slices = self
            .pizza_slices
            .checked_add(1)
            .ok_or_else(|| crate::Error::Other("pizza slice counter overflow".to_string()))?;

        self.coins = coins;
        self.pizza_slices = slices;
        Ok(())
    }

    /// Consumption transition: `pizzaSlices -= 1; pizzasEaten += 1`
    ///
    /// Leaves `self` untouched on failure.
    pub fn eat_slice(&mut self) -> crate::Result<()> {
        let slices = self
            .pizza_slices
            .checked_sub(1)
            .ok_or_else(|| crate::Error::NoInventory(self.id.to_string()))?;
        let eaten = self
            .pizzas_eaten
            .checked_add(1)
            .ok_or_else(|| crate::Error::Other("pizzas eaten counter overflow".to_string()))?;

        self.pizza_slices = slices;
        self.pizzas_eaten = eaten;
        Ok(())
    }
}

/// One consumption event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Record ID
    #[serde(skip)]
    pub id: RecordId,

    /// Account that ate the slice (back-link only)
    #[serde(rename = "userId")]
    pub account_id: AccountId,

    /// Event timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

impl HistoryRecord {
    /// Event time as a UTC timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }
}

/// Materialized leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Ranked account
    #[serde(rename = "userId")]
    pub account_id: AccountId,

    /// Name snapshot taken at rebuild time
    pub name: String,

    /// Counter snapshot taken at rebuild time
    pub pizzas_eaten: u64,

    /// 1-based position
    pub rank: u64,
}

/// Whether the leaderboard reflects the latest committed counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderboardStatus {
    /// The rebuild triggered by this operation succeeded
    Fresh,
    /// The rebuild failed; the view lags until the next successful rebuild
    Stale,
}

/// Outcome of a successful Consume
#[derive(Debug, Clone)]
pub struct ConsumeReceipt {
    /// Account state right after the transition
    pub account: Account,

    /// History record written with the transition
    pub record_id: RecordId,

    /// Leaderboard state after the triggered rebuild
    pub leaderboard: LeaderboardStatus,
}

/// Summary of one rebuild pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Entries written
    pub ranked: usize,

    /// Orphaned entries removed
    pub pruned: usize,

    /// Strategy that produced the ranking
    pub strategy: &'static str,
}
