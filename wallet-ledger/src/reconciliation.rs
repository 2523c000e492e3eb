//! Reconciliation engine: replay the log, compare with cached balances
//!
//! Read-only with respect to account balances. Drift is reported, never
//! corrected.
//!
//! Each account is checked inside its own unit holding a *shared* lock on
//! the account row. Mutations take that row exclusively before writing any
//! entry touching it, so the stored balance and the entries read under the
//! shared lock are from the same point in the account's history.

use crate::{
    storage::Storage,
    types::{AccountId, LedgerEntry, ReconciliationResult},
    Error, Result,
};
use chrono::Utc;

/// Sum the signed contributions of Completed entries to `account_id`
pub fn calculate_balance(account_id: AccountId, entries: &[LedgerEntry]) -> Result<i64> {
    entries.iter().try_fold(0i64, |total, entry| {
        total
            .checked_add(entry.signed_amount_for(account_id))
            .ok_or(Error::BalanceOverflow(account_id))
    })
}

/// Number of results flagged as mismatched
pub fn count_mismatches(results: &[ReconciliationResult]) -> usize {
    results.iter().filter(|r| r.has_mismatch).count()
}

/// Recomputes every account balance from the entry log
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine<'a> {
    storage: &'a Storage,
}

impl<'a> ReconciliationEngine<'a> {
    /// Create an engine over `storage`
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Check every account.
    ///
    /// An account whose check fails (lock timeout, undecodable row) is logged
    /// and skipped; the run goes on. Only failing to enumerate account keys
    /// fails the run.
    pub fn run(&self) -> Result<Vec<ReconciliationResult>> {
        tracing::info!("Starting reconciliation");

        let account_ids = self.storage.account_ids()?;
        let mut results = Vec::with_capacity(account_ids.len());
        let mut skipped = 0usize;

        for account_id in account_ids {
            match self.reconcile_account(account_id) {
                Ok(result) => {
                    if result.has_mismatch {
                        tracing::warn!(
                            account_id = %result.account_id,
                            owner_id = %result.owner_id,
                            stored = result.stored_balance,
                            calculated = result.calculated_balance,
                            difference = result.difference,
                            "Balance mismatch detected"
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::error!(
                        %account_id,
                        error = %e,
                        "Failed to reconcile account, skipping"
                    );
                }
            }
        }

        tracing::info!(
            checked = results.len(),
            mismatches = count_mismatches(&results),
            skipped,
            "Reconciliation completed"
        );

        Ok(results)
    }

    /// Check a single account
    pub fn reconcile_account(&self, account_id: AccountId) -> Result<ReconciliationResult> {
        let unit = self.storage.begin();
        let account = unit.share_account(account_id)?;
        let entries = self.storage.account_entries(account_id)?;
        unit.rollback()?;

        let calculated_balance = calculate_balance(account_id, &entries)?;
        let difference = account
            .balance
            .checked_sub(calculated_balance)
            .ok_or(Error::BalanceOverflow(account_id))?;

        Ok(ReconciliationResult {
            account_id,
            owner_id: account.owner_id,
            stored_balance: account.balance,
            calculated_balance,
            difference,
            has_mismatch: difference != 0,
            checked_at: Utc::now(),
        })
    }
}
