//! Configuration for the economy service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Economy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Document store configuration
    pub store: StoreConfig,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Leaderboard configuration
    pub leaderboard: LeaderboardConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/economy"),
            service_name: "economy-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            store: StoreConfig::default(),
            ledger: LedgerConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which document store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps, lost on restart
    Memory,
    /// RocksDB under `data_dir`
    RocksDb,
}

impl StoreBackend {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StoreBackend::Memory),
            "rocksdb" => Some(StoreBackend::RocksDb),
            _ => None,
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::RocksDb,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// What Consume does when the leaderboard rebuild fails after the
/// counter change has been committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildFailurePolicy {
    /// Report success, mark the leaderboard stale, repair on the next rebuild
    Defer,
    /// Return the rebuild error to the caller; the counter change stays
    Propagate,
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Optimistic transaction attempts before giving up
    pub max_transaction_retries: u32,

    /// Rebuild failure handling
    pub rebuild_failure: RebuildFailurePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_transaction_retries: 16,
            rebuild_failure: RebuildFailurePolicy::Defer,
        }
    }
}

/// Leaderboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Entries returned by `top()` when no size is given
    pub default_top_n: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            default_top_n: crate::types::DEFAULT_TOP_N,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("ECONOMY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("ECONOMY_STORE_BACKEND") {
            config.store.backend = StoreBackend::parse(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown store backend: {}", backend))
            })?;
        }

        if let Ok(json) = std::env::var("ECONOMY_LOG_JSON") {
            config.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        if let Ok(retries) = std::env::var("ECONOMY_MAX_TX_RETRIES") {
            config.ledger.max_transaction_retries = retries.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid ECONOMY_MAX_TX_RETRIES: {}", e))
            })?;
        }

        Ok(config)
    }

    /// Configuration backed by the in-memory store (tests, demos)
    pub fn in_memory() -> Self {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Memory;
        config
    }
}
