//! Main ledger orchestration layer
//!
//! [`Ledger`] is the async entry point. Each operation runs its store work on
//! the blocking pool, so lock waits park a worker thread rather than the
//! runtime. Clones share one store and one metrics registry.
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{types::OwnerId, Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let owner = OwnerId::new();
//!     ledger.create_account(owner).await?;
//!     ledger.fund(owner, 10_000, "deposit-1").await?;
//!
//!     let page = ledger.history(owner, 1, 10).await?;
//!     assert_eq!(page.total, 1);
//!     Ok(())
//! }
//! ```

use crate::{
    config::HistoryConfig,
    metrics::Metrics,
    mutator::BalanceMutator,
    reconciliation::{count_mismatches, ReconciliationEngine},
    retry::with_retry,
    storage::Storage,
    transfer::TransferCoordinator,
    types::{Account, HistoryPage, LedgerEntry, Outcome, OwnerId, ReconciliationResult},
    Config, Error, Result,
};
use std::{sync::Arc, time::Instant};

/// Main ledger interface
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Shared store
    storage: Arc<Storage>,

    /// Configuration
    config: Arc<Config>,

    /// Collectors for this ledger
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let storage = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || Storage::open(&config)).await??
        };

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = %config.data_dir.display(),
            "Ledger opened"
        );

        Ok(Self {
            storage: Arc::new(storage),
            config: Arc::new(config),
            metrics,
        })
    }

    /// Create the account for a new owner, with a zero balance
    pub async fn create_account(&self, owner_id: OwnerId) -> Result<Account> {
        let result = self
            .blocking(move |storage, config, metrics| {
                with_retry(&config.retry, metrics, "create_account", |_| {
                    let account = Account::open(owner_id);
                    let unit = storage.begin();
                    unit.insert_account(&account)?;
                    unit.commit()?;
                    Ok(account)
                })
            })
            .await;

        match &result {
            Ok(account) => {
                tracing::info!(
                    account_id = %account.account_id,
                    %owner_id,
                    "Account created"
                );
                self.metrics.record_operation("create_account", "applied");
            }
            Err(e) => self.metrics.record_operation("create_account", e.kind_label()),
        }

        result
    }

    /// Look up an owner's account
    pub async fn account(&self, owner_id: OwnerId) -> Result<Account> {
        self.blocking(move |storage, _, _| storage.get_account_by_owner(owner_id))
            .await
    }

    /// Credit an owner's account
    pub async fn fund(
        &self,
        owner_id: OwnerId,
        amount: i64,
        reference: &str,
    ) -> Result<LedgerEntry> {
        let reference = reference.to_string();
        let result = self
            .blocking(move |storage, config, metrics| {
                BalanceMutator::new(storage, config, metrics).fund(owner_id, amount, &reference)
            })
            .await;

        self.finish("fund", result)
    }

    /// Debit an owner's account
    pub async fn withdraw(
        &self,
        owner_id: OwnerId,
        amount: i64,
        reference: &str,
    ) -> Result<LedgerEntry> {
        let reference = reference.to_string();
        let result = self
            .blocking(move |storage, config, metrics| {
                BalanceMutator::new(storage, config, metrics).withdraw(owner_id, amount, &reference)
            })
            .await;

        self.finish("withdraw", result)
    }

    /// Move `amount` from one owner's account to another's
    pub async fn transfer(
        &self,
        source_owner: OwnerId,
        destination_owner: OwnerId,
        amount: i64,
        reference: &str,
    ) -> Result<LedgerEntry> {
        let reference = reference.to_string();
        let result = self
            .blocking(move |storage, config, metrics| {
                TransferCoordinator::new(storage, config, metrics).transfer(
                    source_owner,
                    destination_owner,
                    amount,
                    &reference,
                )
            })
            .await;

        self.finish("transfer", result)
    }

    /// Entries touching an owner's account, newest first.
    ///
    /// `page` below 1 means the first page; `page_size` below 1 means the
    /// configured default, and anything above the configured maximum is
    /// capped.
    pub async fn history(
        &self,
        owner_id: OwnerId,
        page: i64,
        page_size: i64,
    ) -> Result<HistoryPage> {
        let (page, page_size) = normalize_paging(page, page_size, &self.config.history);

        self.blocking(move |storage, _, _| {
            let account_id = storage.account_id_for_owner(owner_id)?;
            let offset = (page - 1).saturating_mul(page_size);
            let (entry_ids, total) =
                storage.account_entry_ids_page(account_id, offset, page_size)?;

            let entries = entry_ids
                .into_iter()
                .map(|entry_id| storage.get_entry(entry_id))
                .collect::<Result<Vec<_>>>()?;

            Ok(HistoryPage {
                entries,
                total,
                page,
                page_size,
            })
        })
        .await
    }

    /// Compare every stored balance with the sum of its entries
    pub async fn reconcile(&self) -> Result<Vec<ReconciliationResult>> {
        let result = self
            .blocking(|storage, _, metrics| {
                let started = Instant::now();
                let results = ReconciliationEngine::new(storage).run()?;
                metrics.record_reconciliation(
                    count_mismatches(&results),
                    started.elapsed().as_secs_f64(),
                );
                Ok(results)
            })
            .await;

        match &result {
            Ok(_) => self.metrics.record_operation("reconcile", "completed"),
            Err(e) => self.metrics.record_operation("reconcile", e.kind_label()),
        }

        result
    }

    /// Metrics for this ledger
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run store work on the blocking pool
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Storage, &Config, &Metrics) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let config = Arc::clone(&self.config);
        let metrics = self.metrics.clone();

        tokio::task::spawn_blocking(move || work(&storage, &config, &metrics)).await?
    }

    /// Record the outcome of a mutation and unwrap its entry
    fn finish(&self, operation: &str, result: Result<Outcome>) -> Result<LedgerEntry> {
        match result {
            Ok(Outcome::Applied(entry)) => {
                self.metrics.record_operation(operation, "applied");
                Ok(entry)
            }
            Ok(Outcome::Replayed(entry)) => {
                self.metrics.record_operation(operation, "replayed");
                self.metrics.record_replay();
                Ok(entry)
            }
            Err(e) => {
                tracing::debug!(operation, error = %e, "Operation rejected");
                self.metrics.record_operation(operation, e.kind_label());
                Err(e)
            }
        }
    }
}

/// Resolve caller paging input to a 1-based page and a bounded page size
pub fn normalize_paging(page: i64, page_size: i64, limits: &HistoryConfig) -> (usize, usize) {
    let page = if page < 1 { 1 } else { page as usize };

    let page_size = if page_size < 1 {
        limits.default_page_size
    } else {
        (page_size as usize).min(limits.max_page_size)
    };

    (page, page_size)
}
