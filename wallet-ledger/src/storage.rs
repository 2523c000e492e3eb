//! Ledger store on a pessimistic RocksDB `TransactionDB`
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account_id)
//! - `owners` - One account per owner (key: owner_id, value: account_id)
//! - `entries` - Immutable ledger entries (key: entry_id, UUIDv7)
//! - `references` - Reference uniqueness (key: reference, value: entry_id)
//! - `account_entries` - History index (key: account_id || entry_id)
//!
//! # Units of work
//!
//! All mutations go through a [`UnitOfWork`], one RocksDB transaction.
//! Row exclusivity comes from `get_for_update`: a second unit touching the
//! same account (or reference) blocks until the first commits or rolls back,
//! or reports [`Error::Conflict`] once the lock timeout elapses.
//!
//! Units lock account rows first, in ascending [`AccountId`] order, and the
//! reference key last. No unit ever waits on an account while holding a
//! reference, so lock waits cannot form a cycle.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, LedgerEntry, OwnerId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    SingleThreaded, Transaction, TransactionDB, TransactionDBOptions, TransactionOptions,
    WriteOptions,
};
use std::path::PathBuf;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_OWNERS: &str = "owners";
const CF_ENTRIES: &str = "entries";
const CF_REFERENCES: &str = "references";
const CF_ACCOUNT_ENTRIES: &str = "account_entries";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: TransactionDB<SingleThreaded>,
    path: PathBuf,
    lock_timeout_ms: i64,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("lock_timeout_ms", &self.lock_timeout_ms)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.rocksdb.lock_timeout_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_OWNERS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_REFERENCES, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_ACCOUNT_ENTRIES, Self::cf_options_index()),
        ];

        let db = TransactionDB::<SingleThreaded>::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = %path.display(),
            lock_timeout_ms = config.rocksdb.lock_timeout_ms,
            "Opened ledger store"
        );

        Ok(Self {
            db,
            path: path.clone(),
            lock_timeout_ms: config.rocksdb.lock_timeout_ms,
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Account rows are read on every mutation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StorageUnavailable(format!("Column family {} not found", name)))
    }

    /// Begin an atomic, isolated unit of work
    pub fn begin(&self) -> UnitOfWork<'_> {
        let write_opts = WriteOptions::default();
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);

        UnitOfWork {
            txn: self.db.transaction_opt(&write_opts, &txn_opts),
            storage: self,
        }
    }

    // Account reads (committed state, no locks)

    /// Get account by ID
    pub fn get_account(&self, account_id: AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        let value = self
            .db
            .get_cf(cf, account_id.as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Resolve an owner to its account ID
    pub fn account_id_for_owner(&self, owner_id: OwnerId) -> Result<AccountId> {
        let cf = self.cf_handle(CF_OWNERS)?;

        let value = self
            .db
            .get_cf(cf, owner_id.as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(format!("owner {}", owner_id)))?;

        decode_uuid(&value).map(AccountId::from_uuid)
    }

    /// Get an owner's account
    pub fn get_account_by_owner(&self, owner_id: OwnerId) -> Result<Account> {
        let account_id = self.account_id_for_owner(owner_id)?;
        self.get_account(account_id)
    }

    /// All account IDs, in order, decoded from keys only
    pub fn account_ids(&self) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            ids.push(AccountId::from_uuid(decode_uuid(&key)?));
        }

        Ok(ids)
    }

    // Entry reads

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;

        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Look up the committed entry holding `reference`
    pub fn find_entry_by_reference(&self, reference: &str) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_REFERENCES)?;

        match self.db.get_cf(cf, reference.as_bytes())? {
            Some(value) => {
                let entry_id = decode_uuid(&value)?;
                self.get_entry(entry_id).map(Some)
            }
            None => Ok(None),
        }
    }

    /// IDs of entries touching an account, oldest first
    pub fn account_entry_ids(&self, account_id: AccountId) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_ACCOUNT_ENTRIES)?;
        let prefix = account_id.as_bytes();

        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            ids.push(decode_uuid(&key[prefix.len()..])?);
        }

        Ok(ids)
    }

    /// One page of entry IDs touching an account, newest first, plus the
    /// account's total entry count.
    ///
    /// Walks the index backwards; only `limit` IDs after `offset` are kept.
    pub fn account_entry_ids_page(
        &self,
        account_id: AccountId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Uuid>, u64)> {
        let cf = self.cf_handle(CF_ACCOUNT_ENTRIES)?;
        let prefix = account_id.as_bytes();
        // Sorts after every account_id || entry_id key of this account
        let mut upper = prefix.to_vec();
        upper.extend_from_slice(&[0xff; 16]);

        let mut ids = Vec::with_capacity(limit);
        let mut total = 0u64;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse));

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let position = total as usize;
            if position >= offset && ids.len() < limit {
                ids.push(decode_uuid(&key[prefix.len()..])?);
            }
            total += 1;
        }

        Ok((ids, total))
    }

    /// Entries touching an account, oldest first
    pub fn account_entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>> {
        self.account_entry_ids(account_id)?
            .into_iter()
            .map(|entry_id| self.get_entry(entry_id))
            .collect()
    }

    fn index_key_account_entry(account_id: AccountId, entry_id: Uuid) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.extend_from_slice(entry_id.as_bytes());
        key
    }
}

fn decode_uuid(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes)
        .map_err(|e| Error::StorageUnavailable(format!("Corrupt id in store: {}", e)))
}

/// One atomic, isolated group of reads and writes.
///
/// Nothing is visible to other units until [`commit`](Self::commit)
/// succeeds; dropping the unit without committing discards its writes and
/// releases its locks.
pub struct UnitOfWork<'db> {
    txn: Transaction<'db, TransactionDB<SingleThreaded>>,
    storage: &'db Storage,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("storage", &self.storage.path)
            .finish_non_exhaustive()
    }
}

impl<'db> UnitOfWork<'db> {
    /// Read an account holding an exclusive lock until the unit ends
    pub fn lock_account(&self, account_id: AccountId) -> Result<Account> {
        self.read_account(account_id, true)
    }

    /// Read an account holding a shared lock; blocks writers, not readers
    pub fn share_account(&self, account_id: AccountId) -> Result<Account> {
        self.read_account(account_id, false)
    }

    fn read_account(&self, account_id: AccountId, exclusive: bool) -> Result<Account> {
        let cf = self.storage.cf_handle(CF_ACCOUNTS)?;

        let value = self
            .txn
            .get_for_update_cf(cf, account_id.as_bytes(), exclusive)?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Write a locked account row back
    pub(crate) fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.storage.cf_handle(CF_ACCOUNTS)?;
        self.txn
            .put_cf(cf, account.account_id.as_bytes(), bincode::serialize(account)?)?;
        Ok(())
    }

    /// Create an account, enforcing one account per owner
    pub(crate) fn insert_account(&self, account: &Account) -> Result<()> {
        let cf_owners = self.storage.cf_handle(CF_OWNERS)?;
        let owner_key = account.owner_id.as_bytes();

        if self.txn.get_for_update_cf(cf_owners, owner_key, true)?.is_some() {
            return Err(Error::AccountAlreadyExists(account.owner_id));
        }

        self.txn
            .put_cf(cf_owners, owner_key, account.account_id.as_bytes())?;
        self.put_account(account)
    }

    /// Lock `reference` and fail if a committed entry already holds it.
    ///
    /// This is the serialization point for idempotency: concurrent units
    /// with the same reference queue on the key lock, and every one after
    /// the first to commit observes [`Error::DuplicateReference`].
    pub fn claim_reference(&self, reference: &str) -> Result<()> {
        let cf = self.storage.cf_handle(CF_REFERENCES)?;

        if self
            .txn
            .get_for_update_cf(cf, reference.as_bytes(), true)?
            .is_some()
        {
            return Err(Error::DuplicateReference(reference.to_string()));
        }

        Ok(())
    }

    /// Append an entry with its reference row and history index
    pub(crate) fn put_entry(&self, entry: &LedgerEntry) -> Result<()> {
        self.claim_reference(&entry.reference)?;

        let cf_entries = self.storage.cf_handle(CF_ENTRIES)?;
        self.txn
            .put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?)?;

        let cf_references = self.storage.cf_handle(CF_REFERENCES)?;
        self.txn
            .put_cf(cf_references, entry.reference.as_bytes(), entry.entry_id.as_bytes())?;

        let cf_index = self.storage.cf_handle(CF_ACCOUNT_ENTRIES)?;
        for account_id in entry.touched_accounts() {
            let key = Storage::index_key_account_entry(account_id, entry.entry_id);
            self.txn.put_cf(cf_index, &key, b"")?;
        }

        Ok(())
    }

    /// Commit; lock or write races surface as [`Error::Conflict`]
    pub fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    /// Discard all writes and release locks
    pub fn rollback(self) -> Result<()> {
        self.txn.rollback()?;
        Ok(())
    }
}
