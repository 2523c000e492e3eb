//! Transfer coordinator: two-account movement in one unit of work
//!
//! # Lock ordering
//!
//! Both account rows are locked in ascending [`AccountId`] order, never in
//! "source, then destination" order. Two opposite transfers between the same
//! pair (A→B and B→A) therefore queue on the same first lock instead of each
//! holding one row and waiting on the other. The order is a total order on a
//! stable key, so it holds for any mix of concurrent transfers.

use crate::{
    config::Config,
    idempotency::{IdempotencyGuard, Intent},
    metrics::Metrics,
    retry::with_retry,
    storage::{Storage, UnitOfWork},
    types::{Account, AccountId, LedgerEntry, Outcome, OwnerId},
    Error, Result,
};

/// Orders two accounts for locking: lower ID first
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Moves value between two accounts
#[derive(Debug)]
pub struct TransferCoordinator<'a> {
    storage: &'a Storage,
    config: &'a Config,
    metrics: &'a Metrics,
}

impl<'a> TransferCoordinator<'a> {
    /// Create a coordinator over `storage`
    pub fn new(storage: &'a Storage, config: &'a Config, metrics: &'a Metrics) -> Self {
        Self {
            storage,
            config,
            metrics,
        }
    }

    /// Debit the source owner and credit the destination owner atomically.
    ///
    /// Amount and same-owner checks run before any store access.
    pub fn transfer(
        &self,
        source_owner: OwnerId,
        destination_owner: OwnerId,
        amount: i64,
        reference: &str,
    ) -> Result<Outcome> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        if source_owner == destination_owner {
            return Err(Error::SameAccount);
        }

        let source_id = self.storage.account_id_for_owner(source_owner)?;
        let destination_id = self.storage.account_id_for_owner(destination_owner)?;
        if source_id == destination_id {
            return Err(Error::SameAccount);
        }

        let guard = IdempotencyGuard::new(self.storage, self.config.idempotency.strict_references);
        let intent = Intent::transfer(source_id, destination_id, amount);

        guard.run(reference, &intent, || {
            with_retry(&self.config.retry, self.metrics, "transfer", |attempt| {
                self.transfer_once(
                    source_id,
                    destination_owner,
                    destination_id,
                    amount,
                    reference,
                    attempt,
                )
            })
        })
    }

    fn transfer_once(
        &self,
        source_id: AccountId,
        destination_owner: OwnerId,
        destination_id: AccountId,
        amount: i64,
        reference: &str,
        attempt: u32,
    ) -> Result<LedgerEntry> {
        let unit = self.storage.begin();

        let (mut source, mut destination) = lock_pair(&unit, source_id, destination_id)?;
        unit.claim_reference(reference)?;

        let source_balance = source.debited(amount)?;
        let destination_balance = destination.credited(amount)?;

        let entry = LedgerEntry::transfer(
            source_id,
            destination_id,
            amount,
            reference,
            format!("Transfer to {}", destination_owner),
        );

        source.balance = source_balance;
        source.updated_at = entry.created_at;
        destination.balance = destination_balance;
        destination.updated_at = entry.created_at;

        unit.put_entry(&entry)?;
        unit.put_account(&source)?;
        unit.put_account(&destination)?;
        unit.commit()?;

        tracing::info!(
            source = %source_id,
            destination = %destination_id,
            reference,
            amount,
            source_balance,
            destination_balance,
            attempt,
            "Transfer applied"
        );

        Ok(entry)
    }
}

/// Lock both rows in [`lock_order`], returning them as (source, destination)
fn lock_pair(
    unit: &UnitOfWork<'_>,
    source_id: AccountId,
    destination_id: AccountId,
) -> Result<(Account, Account)> {
    let (first_id, second_id) = lock_order(source_id, destination_id);

    let first = unit.lock_account(first_id)?;
    let second = unit.lock_account(second_id)?;

    tracing::debug!(first = %first_id, second = %second_id, "Locked transfer pair");

    if first_id == source_id {
        Ok((first, second))
    } else {
        Ok((second, first))
    }
}
