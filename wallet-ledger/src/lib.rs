//! Wallet Ledger
//!
//! Double-entry style wallet ledger: per-owner accounts, an immutable log of
//! entries, and cached balances that always equal the sum of that log.
//!
//! # Architecture
//!
//! - **Units of Work**: Every mutation is one pessimistic RocksDB transaction
//! - **Row Locks**: Writers serialize per account, disjoint accounts run in parallel
//! - **Idempotency**: A reference produces at most one entry, replays return it
//! - **Reconciliation**: Balances are recomputed from the log and drift reported
//!
//! # Invariants
//!
//! - Non-negativity: No committed balance is ever below zero
//! - Balance consistency: balance == Σ(credits) + Σ(inbound) - Σ(debits) - Σ(outbound)
//! - Conservation: A transfer moves value and never creates or destroys it
//! - Append-only: Entries are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod idempotency;
pub mod mutator;
pub mod transfer;
pub mod reconciliation;
pub mod retry;
pub mod ledger;
pub mod scheduler;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    Account, AccountId, EntryKind, EntryStatus, HistoryPage, LedgerEntry, Outcome, OwnerId,
    ReconciliationResult,
};
pub use ledger::Ledger;
pub use config::Config;
pub use scheduler::{ReconciliationHandle, ReconciliationScheduler};
pub use storage::Storage;
