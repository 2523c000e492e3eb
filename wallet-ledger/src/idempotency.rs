//! Idempotency guard: at most one effect per reference
//!
//! The pre-check in [`IdempotencyGuard::admit`] is a fast path only. Two
//! callers can both pass it; the real serialization point is
//! [`UnitOfWork::claim_reference`](crate::storage::UnitOfWork::claim_reference),
//! which locks the reference key inside the mutating unit. The loser sees
//! [`Error::DuplicateReference`], and [`IdempotencyGuard::run`] turns that
//! into a replay of the winner's entry.

use crate::{
    storage::Storage,
    types::{AccountId, EntryKind, LedgerEntry, Outcome},
    Error, Result,
};

/// What a caller asked for, used to compare against a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    /// Requested entry kind
    pub kind: EntryKind,
    /// Requested amount
    pub amount: i64,
    /// Owning (source) account
    pub account_id: AccountId,
    /// Transfer destination
    pub destination: Option<AccountId>,
}

impl Intent {
    /// Single-account credit or debit
    pub fn single(kind: EntryKind, account_id: AccountId, amount: i64) -> Self {
        Self {
            kind,
            amount,
            account_id,
            destination: None,
        }
    }

    /// Transfer between two accounts
    pub fn transfer(source: AccountId, destination: AccountId, amount: i64) -> Self {
        Self {
            kind: EntryKind::Transfer,
            amount,
            account_id: source,
            destination: Some(destination),
        }
    }

    /// Describe how `entry` differs from this intent, if it does
    pub fn difference(&self, entry: &LedgerEntry) -> Option<String> {
        let mut diffs = Vec::new();

        if entry.kind != self.kind {
            diffs.push(format!("kind {} != {}", entry.kind, self.kind));
        }
        if entry.amount != self.amount {
            diffs.push(format!("amount {} != {}", entry.amount, self.amount));
        }
        if entry.account_id != self.account_id {
            diffs.push(format!("account {} != {}", entry.account_id, self.account_id));
        }
        if entry.destination_account_id != self.destination {
            diffs.push("destination differs".to_string());
        }

        if diffs.is_empty() {
            None
        } else {
            Some(diffs.join(", "))
        }
    }
}

/// Result of the fast-path check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No committed entry holds the reference yet
    Admitted,
    /// The reference is taken by this entry
    AlreadyExists(LedgerEntry),
}

/// Enforces at-most-one effect per reference
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyGuard<'a> {
    storage: &'a Storage,
    strict: bool,
}

impl<'a> IdempotencyGuard<'a> {
    /// Create a guard; `strict` rejects reused references whose stored entry
    /// differs from the new request instead of replaying it
    pub fn new(storage: &'a Storage, strict: bool) -> Self {
        Self { storage, strict }
    }

    /// Fast-path check against committed entries
    pub fn admit(&self, reference: &str) -> Result<Admission> {
        Ok(match self.storage.find_entry_by_reference(reference)? {
            Some(entry) => Admission::AlreadyExists(entry),
            None => Admission::Admitted,
        })
    }

    /// Run `apply` at most once per reference.
    ///
    /// `apply` must create the entry through
    /// [`UnitOfWork::put_entry`](crate::storage::UnitOfWork::put_entry) so
    /// that a lost race surfaces as [`Error::DuplicateReference`].
    pub fn run(
        &self,
        reference: &str,
        intent: &Intent,
        apply: impl FnOnce() -> Result<LedgerEntry>,
    ) -> Result<Outcome> {
        if let Admission::AlreadyExists(entry) = self.admit(reference)? {
            return self.replay(reference, intent, entry);
        }

        match apply() {
            Ok(entry) => Ok(Outcome::Applied(entry)),
            Err(Error::DuplicateReference(_)) => {
                tracing::debug!(reference, "Lost reference race, fetching winner");
                let entry = self.resolve_duplicate(reference)?;
                self.replay(reference, intent, entry)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-fetch the committed entry after a uniqueness violation
    pub fn resolve_duplicate(&self, reference: &str) -> Result<LedgerEntry> {
        // The claim only fails once the holder has committed
        self.storage.find_entry_by_reference(reference)?.ok_or_else(|| {
            Error::Conflict(format!("Reference {} claimed but not yet visible", reference))
        })
    }

    fn replay(&self, reference: &str, intent: &Intent, entry: LedgerEntry) -> Result<Outcome> {
        if let Some(detail) = intent.difference(&entry) {
            tracing::warn!(
                reference,
                entry_id = %entry.entry_id,
                %detail,
                "Reference reused for a different operation"
            );

            if self.strict {
                return Err(Error::ReferenceMismatch {
                    reference: reference.to_string(),
                    detail,
                });
            }
        }

        tracing::info!(reference, entry_id = %entry.entry_id, "Replaying existing entry");
        Ok(Outcome::Replayed(entry))
    }
}
