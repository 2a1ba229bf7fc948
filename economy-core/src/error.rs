//! Error types for the economy core

use thiserror::Error;

/// Result type for economy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Economy errors
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced account (or document) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Balance below the slice price
    #[error("Insufficient funds for account {account}: {coins} coins, price is {price}")]
    InsufficientFunds {
        /// Account that attempted the purchase
        account: String,
        /// Balance observed at the time of the check
        coins: u64,
        /// Price that was required
        price: u64,
    },

    /// No pizza slice available to consume
    #[error("No pizza slices available for account {0}")]
    NoInventory(String),

    /// Compare-and-swap precondition failed inside a commit
    #[error("Version conflict on {collection}/{id}: expected {expected}, found {found:?}")]
    VersionConflict {
        /// Collection of the conflicting document
        collection: String,
        /// Document ID
        id: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored (None if the document vanished)
        found: Option<u64>,
    },

    /// Transaction retries exhausted under concurrent writers
    #[error("Contention: {0}")]
    Contention(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the caller-facing "missing account" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Short machine-readable reason, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::NoInventory(_) => "no_inventory",
            Error::VersionConflict { .. } => "version_conflict",
            Error::Contention(_) => "contention",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        assert_eq!(Error::NotFound("a".into()).reason(), "not_found");
        assert_eq!(Error::NoInventory("a".into()).reason(), "no_inventory");
        let err = Error::InsufficientFunds {
            account: "a".into(),
            coins: 5,
            price: 10,
        };
        assert_eq!(err.reason(), "insufficient_funds");
        assert!(err.to_string().contains("5 coins"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::from("boom").is_not_found());
    }
}
