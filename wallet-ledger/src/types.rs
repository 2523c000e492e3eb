//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (i64 in the smallest currency unit, never floats)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier.
///
/// Ordered by its UUID bytes; transfers lock accounts in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a fresh, time-ordered account ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner reference (the user an account belongs to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Create a random owner ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-owner account holding a cached balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub account_id: AccountId,

    /// Owner of the account
    pub owner_id: OwnerId,

    /// Balance in the smallest currency unit, never negative once committed
    pub balance: i64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account with a zero balance
    pub fn open(owner_id: OwnerId) -> Self {
        let now = Utc::now();
        Self {
            account_id: AccountId::new(),
            owner_id,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance after crediting `amount`
    pub fn credited(&self, amount: i64) -> crate::Result<i64> {
        self.balance
            .checked_add(amount)
            .ok_or(crate::Error::BalanceOverflow(self.account_id))
    }

    /// Balance after debiting `amount`, failing if it would go negative
    pub fn debited(&self, amount: i64) -> crate::Result<i64> {
        if self.balance < amount {
            return Err(crate::Error::InsufficientFunds {
                account_id: self.account_id,
                available: self.balance,
                requested: amount,
            });
        }
        Ok(self.balance - amount)
    }
}

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Funds added to one account
    Credit = 1,
    /// Funds removed from one account
    Debit = 2,
    /// Funds moved between two accounts
    Transfer = 3,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
            EntryKind::Transfer => "transfer",
        };
        f.write_str(s)
    }
}

/// Entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryStatus {
    /// Not yet applied
    Pending = 1,
    /// Applied together with its balance change
    Completed = 2,
    /// Rejected
    Failed = 3,
}

/// Immutable transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Kind of movement
    pub kind: EntryKind,

    /// Positive amount in the smallest currency unit
    pub amount: i64,

    /// Status (entries are written already Completed)
    pub status: EntryStatus,

    /// Caller-supplied idempotency key, unique across all entries
    pub reference: String,

    /// Owning account (the source for transfers)
    pub account_id: AccountId,

    /// Transfer source
    pub source_account_id: Option<AccountId>,

    /// Transfer destination
    pub destination_account_id: Option<AccountId>,

    /// Human readable description
    pub description: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Completed single-account entry
    pub fn single(
        kind: EntryKind,
        account_id: AccountId,
        amount: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            kind,
            amount,
            status: EntryStatus::Completed,
            reference: reference.into(),
            account_id,
            source_account_id: None,
            destination_account_id: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Completed transfer entry, owned by the source account
    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        amount: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            kind: EntryKind::Transfer,
            amount,
            status: EntryStatus::Completed,
            reference: reference.into(),
            account_id: source,
            source_account_id: Some(source),
            destination_account_id: Some(destination),
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Accounts whose history includes this entry
    pub fn touched_accounts(&self) -> Vec<AccountId> {
        let mut accounts = vec![self.account_id];
        for id in [self.source_account_id, self.destination_account_id]
            .into_iter()
            .flatten()
        {
            if !accounts.contains(&id) {
                accounts.push(id);
            }
        }
        accounts
    }

    /// Signed effect of this entry on `account_id`'s balance.
    ///
    /// Only Completed entries contribute.
    pub fn signed_amount_for(&self, account_id: AccountId) -> i64 {
        if self.status != EntryStatus::Completed {
            return 0;
        }

        match self.kind {
            EntryKind::Credit if self.account_id == account_id => self.amount,
            EntryKind::Debit if self.account_id == account_id => -self.amount,
            EntryKind::Transfer => {
                let mut delta = 0;
                if self.source_account_id == Some(account_id) {
                    delta -= self.amount;
                }
                if self.destination_account_id == Some(account_id) {
                    delta += self.amount;
                }
                delta
            }
            _ => 0,
        }
    }
}

/// Outcome of a balance-changing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This call created the entry and moved the balance(s)
    Applied(LedgerEntry),
    /// The reference was already used; nothing moved
    Replayed(LedgerEntry),
}

impl Outcome {
    /// The entry, regardless of who created it
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Outcome::Applied(entry) | Outcome::Replayed(entry) => entry,
        }
    }

    /// Consume into the entry
    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Outcome::Applied(entry) | Outcome::Replayed(entry) => entry,
        }
    }

    /// Whether this call was a replay
    pub fn is_replay(&self) -> bool {
        matches!(self, Outcome::Replayed(_))
    }
}

/// Derived comparison of a stored balance against the replayed log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Account checked
    pub account_id: AccountId,

    /// Owner of the account
    pub owner_id: OwnerId,

    /// Cached balance on the account row
    pub stored_balance: i64,

    /// Balance derived from Completed entries
    pub calculated_balance: i64,

    /// stored - calculated
    pub difference: i64,

    /// difference != 0
    pub has_mismatch: bool,

    /// When the comparison ran
    pub checked_at: DateTime<Utc>,
}

/// One page of an account's history, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Entries on this page
    pub entries: Vec<LedgerEntry>,

    /// Entries touching the account overall
    pub total: u64,

    /// Effective page number (1-based)
    pub page: usize,

    /// Effective page size
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount_single() {
        let account = AccountId::new();
        let other = AccountId::new();

        let credit = LedgerEntry::single(EntryKind::Credit, account, 500, "c1", "Wallet funding");
        assert_eq!(credit.signed_amount_for(account), 500);
        assert_eq!(credit.signed_amount_for(other), 0);

        let debit = LedgerEntry::single(EntryKind::Debit, account, 200, "d1", "Wallet withdrawal");
        assert_eq!(debit.signed_amount_for(account), -200);
    }

    #[test]
    fn test_signed_amount_transfer() {
        let source = AccountId::new();
        let destination = AccountId::new();
        let entry = LedgerEntry::transfer(source, destination, 300, "t1", "Transfer");

        assert_eq!(entry.signed_amount_for(source), -300);
        assert_eq!(entry.signed_amount_for(destination), 300);
        assert_eq!(entry.touched_accounts(), vec![source, destination]);
    }

    #[test]
    fn test_non_completed_entries_do_not_count() {
        let account = AccountId::new();
        let mut entry = LedgerEntry::single(
            EntryKind::Credit,
            account,
            500,
            "c1",
            "Wallet funding",
        );
        entry.status = EntryStatus::Failed;
        assert_eq!(entry.signed_amount_for(account), 0);
    }

    #[test]
    fn test_account_debit_guard() {
        let mut account = Account::open(OwnerId::new());
        account.balance = 100;

        assert_eq!(account.debited(100).unwrap(), 0);
        assert!(matches!(
            account.debited(101),
            Err(crate::Error::InsufficientFunds { available: 100, requested: 101, .. })
        ));
    }

    #[test]
    fn test_account_credit_overflow() {
        let mut account = Account::open(OwnerId::new());
        account.balance = i64::MAX;
        assert!(matches!(account.credited(1), Err(crate::Error::BalanceOverflow(_))));
    }

    #[test]
    fn test_account_ids_are_ordered() {
        let a = AccountId::from_uuid(Uuid::from_u128(1));
        let b = AccountId::from_uuid(Uuid::from_u128(2));
        assert!(a < b);
    }
}
