//! Balance mutator: single-account credit and debit
//!
//! Each accepted operation is one unit of work that locks the account row,
//! claims the reference, checks funds against the locked balance, and writes
//! the entry together with the new balance. The read-check-write sequence
//! never spans two units, so concurrent writers cannot lose updates.

use crate::{
    config::Config,
    idempotency::{IdempotencyGuard, Intent},
    metrics::Metrics,
    retry::with_retry,
    storage::Storage,
    types::{Account, AccountId, EntryKind, LedgerEntry, Outcome, OwnerId},
    Error, Result,
};

/// Direction of a single-account balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movement {
    Fund,
    Withdraw,
}

impl Movement {
    fn kind(self) -> EntryKind {
        match self {
            Movement::Fund => EntryKind::Credit,
            Movement::Withdraw => EntryKind::Debit,
        }
    }

    /// Label used for retry logs and metrics
    fn operation(self) -> &'static str {
        match self {
            Movement::Fund => "fund",
            Movement::Withdraw => "withdraw",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Movement::Fund => "Wallet funding",
            Movement::Withdraw => "Wallet withdrawal",
        }
    }

    fn apply_to(self, account: &Account, amount: i64) -> Result<i64> {
        match self {
            Movement::Fund => account.credited(amount),
            Movement::Withdraw => account.debited(amount),
        }
    }
}

/// Applies fund and withdraw operations
#[derive(Debug)]
pub struct BalanceMutator<'a> {
    storage: &'a Storage,
    config: &'a Config,
    metrics: &'a Metrics,
}

impl<'a> BalanceMutator<'a> {
    /// Create a mutator over `storage`
    pub fn new(storage: &'a Storage, config: &'a Config, metrics: &'a Metrics) -> Self {
        Self {
            storage,
            config,
            metrics,
        }
    }

    /// Credit an owner's account
    pub fn fund(&self, owner_id: OwnerId, amount: i64, reference: &str) -> Result<Outcome> {
        self.apply(owner_id, Movement::Fund, amount, reference)
    }

    /// Debit an owner's account; never takes the balance below zero
    pub fn withdraw(&self, owner_id: OwnerId, amount: i64, reference: &str) -> Result<Outcome> {
        self.apply(owner_id, Movement::Withdraw, amount, reference)
    }

    fn apply(
        &self,
        owner_id: OwnerId,
        movement: Movement,
        amount: i64,
        reference: &str,
    ) -> Result<Outcome> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        let account_id = self.storage.account_id_for_owner(owner_id)?;
        let guard = IdempotencyGuard::new(self.storage, self.config.idempotency.strict_references);
        let intent = Intent::single(movement.kind(), account_id, amount);

        guard.run(reference, &intent, || {
            with_retry(&self.config.retry, self.metrics, movement.operation(), |attempt| {
                self.apply_once(account_id, movement, amount, reference, attempt)
            })
        })
    }

    /// One attempt inside one unit of work
    fn apply_once(
        &self,
        account_id: AccountId,
        movement: Movement,
        amount: i64,
        reference: &str,
        attempt: u32,
    ) -> Result<LedgerEntry> {
        let unit = self.storage.begin();

        let mut account = unit.lock_account(account_id)?;
        unit.claim_reference(reference)?;

        let new_balance = movement.apply_to(&account, amount)?;
        let kind = movement.kind();
        let entry =
            LedgerEntry::single(kind, account_id, amount, reference, movement.description());
        let previous_balance = account.balance;
        account.balance = new_balance;
        account.updated_at = entry.created_at;

        unit.put_entry(&entry)?;
        unit.put_account(&account)?;
        unit.commit()?;

        tracing::info!(
            %account_id,
            reference,
            kind = %kind,
            amount,
            previous_balance,
            new_balance,
            attempt,
            "Balance updated"
        );

        Ok(entry)
    }
}
