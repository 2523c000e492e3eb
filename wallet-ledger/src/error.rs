//! Error types for the wallet ledger

use crate::types::{AccountId, OwnerId};
use rocksdb::ErrorKind;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount is zero or negative
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    /// No account for the given owner or id
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Owner already holds an account
    #[error("Account already exists for owner {0}")]
    AccountAlreadyExists(OwnerId),

    /// Entry missing although indexed
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Transfer source and destination are the same owner
    #[error("Cannot transfer to the same account")]
    SameAccount,

    /// Debit exceeds the locked balance
    #[error("Insufficient funds in {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Debited account
        account_id: AccountId,
        /// Balance at the time of the check
        available: i64,
        /// Requested debit
        requested: i64,
    },

    /// Reference already claimed by a committed entry.
    ///
    /// Raised by the store inside a unit of work and always converted into a
    /// replay of the existing entry before reaching callers.
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Reference reused for a different operation (strict mode only)
    #[error("Reference {reference} already used for a different operation: {detail}")]
    ReferenceMismatch {
        /// Reused reference
        reference: String,
        /// What differed
        detail: String,
    },

    /// Balance arithmetic left the i64 range
    #[error("Balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    /// A single unit of work lost a lock or commit race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Commit races exhausted the retry budget; resubmit with the same reference
    #[error("Transient conflict after {attempts} attempts")]
    TransientConflict {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Underlying store unreachable or failing
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking task failed to complete
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether resubmitting the same request (same reference) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::TransientConflict { .. })
    }

    /// Short stable label, used for metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AccountNotFound(_) => "account_not_found",
            Error::AccountAlreadyExists(_) => "account_already_exists",
            Error::EntryNotFound(_) => "entry_not_found",
            Error::SameAccount => "same_account",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::DuplicateReference(_) => "duplicate_reference",
            Error::ReferenceMismatch { .. } => "reference_mismatch",
            Error::BalanceOverflow(_) => "balance_overflow",
            Error::Conflict(_) => "conflict",
            Error::TransientConflict { .. } => "transient_conflict",
            Error::StorageUnavailable(_) => "storage_unavailable",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Concurrency(_) => "concurrency",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                Error::Conflict(err.to_string())
            }
            _ => Error::StorageUnavailable(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Concurrency(format!("Blocking task failed: {}", err))
    }
}
