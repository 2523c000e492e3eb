//! Configuration for the wallet ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Log output format ("text" or "json")
    pub log_format: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Commit conflict retry policy
    pub retry: RetryConfig,

    /// History paging
    pub history: HistoryConfig,

    /// Reference handling
    pub idempotency: IdempotencyConfig,

    /// Background reconciliation
    pub reconciliation: ReconciliationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet"),
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_format: "text".to_string(),
            rocksdb: RocksDBConfig::default(),
            retry: RetryConfig::default(),
            history: HistoryConfig::default(),
            idempotency: IdempotencyConfig::default(),
            reconciliation: ReconciliationConfig::default(),
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

    /// How long a unit waits for a row lock before reporting a conflict (ms)
    pub lock_timeout_ms: i64,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
            lock_timeout_ms: 1_000,
        }
    }
}

/// Retry policy for units that lose a lock or commit race
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt, doubled afterwards (ms)
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 5,
        }
    }
}

/// History paging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Page size used when the caller passes < 1
    pub default_page_size: usize,

    /// Upper bound on page size
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// Reference handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Reject a reused reference whose stored entry differs from the request
    /// instead of replaying it
    pub strict_references: bool,
}

/// Background reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Run reconciliation periodically from the server binary
    pub enabled: bool,

    /// Seconds between runs
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3_600,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(format) = std::env::var("WALLET_LOG_FORMAT") {
            config.log_format = format;
        }

        if let Some(size) = parse_env("WALLET_DEFAULT_PAGE_SIZE")? {
            config.history.default_page_size = size;
        }

        if let Some(size) = parse_env("WALLET_MAX_PAGE_SIZE")? {
            config.history.max_page_size = size;
        }

        if let Some(attempts) = parse_env("WALLET_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }

        if let Some(timeout) = parse_env("WALLET_LOCK_TIMEOUT_MS")? {
            config.rocksdb.lock_timeout_ms = timeout;
        }

        if let Some(strict) = parse_env("WALLET_STRICT_REFERENCES")? {
            config.idempotency.strict_references = strict;
        }

        if let Some(enabled) = parse_env("WALLET_RECONCILE_ENABLED")? {
            config.reconciliation.enabled = enabled;
        }

        if let Some(interval) = parse_env("WALLET_RECONCILE_INTERVAL_SECS")? {
            config.reconciliation.interval_secs = interval;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.history.default_page_size == 0 || self.history.max_page_size == 0 {
            return Err(crate::Error::Config(
                "history page sizes must be positive".to_string(),
            ));
        }

        if self.history.default_page_size > self.history.max_page_size {
            return Err(crate::Error::Config(format!(
                "history.default_page_size ({}) exceeds history.max_page_size ({})",
                self.history.default_page_size, self.history.max_page_size
            )));
        }

        if self.rocksdb.lock_timeout_ms <= 0 {
            return Err(crate::Error::Config(
                "rocksdb.lock_timeout_ms must be positive".to_string(),
            ));
        }

        if self.reconciliation.enabled && self.reconciliation.interval_secs == 0 {
            return Err(crate::Error::Config(
                "reconciliation.interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
