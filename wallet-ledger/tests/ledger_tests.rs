//! End-to-end tests through the async ledger facade

use tempfile::TempDir;
use wallet_ledger::{
    reconciliation::count_mismatches, Account, Config, EntryKind, Error, Ledger, OwnerId,
};

async fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    (Ledger::open(config).await.unwrap(), temp_dir)
}

async fn open_owner(ledger: &Ledger) -> OwnerId {
    let owner = OwnerId::new();
    ledger.create_account(owner).await.unwrap();
    owner
}

async fn balance(ledger: &Ledger, owner: OwnerId) -> i64 {
    ledger.account(owner).await.unwrap().balance
}

#[tokio::test]
async fn test_fund_withdraw_transfer_scenario() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;
    let b = open_owner(&ledger).await;

    ledger.fund(a, 10_000, "f1").await.unwrap();
    ledger.withdraw(a, 2_000, "w1").await.unwrap();
    let transfer = ledger.transfer(a, b, 3_000, "t1").await.unwrap();

    assert_eq!(balance(&ledger, a).await, 5_000);
    assert_eq!(balance(&ledger, b).await, 3_000);
    assert_eq!(transfer.kind, EntryKind::Transfer);
    assert_eq!(transfer.description, format!("Transfer to {}", b));

    let results = ledger.reconcile().await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(count_mismatches(&results), 0);
    assert!(results.iter().all(|r| r.difference == 0));
}

#[tokio::test]
async fn test_duplicate_fund_returns_original_entry() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;

    let first = ledger.fund(a, 5_000, "r1").await.unwrap();
    let second = ledger.fund(a, 5_000, "r1").await.unwrap();

    assert_eq!(first.entry_id, second.entry_id);
    assert_eq!(balance(&ledger, a).await, 5_000);
    assert_eq!(ledger.history(a, 1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_overdraw_rejected_without_side_effects() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;
    let b = open_owner(&ledger).await;
    ledger.fund(a, 1_000, "f1").await.unwrap();

    let withdraw = ledger.withdraw(a, 1_001, "w1").await;
    assert!(matches!(
        withdraw,
        Err(Error::InsufficientFunds { available: 1_000, requested: 1_001, .. })
    ));

    let transfer = ledger.transfer(a, b, 5_000, "t1").await;
    assert!(matches!(transfer, Err(Error::InsufficientFunds { .. })));

    assert_eq!(balance(&ledger, a).await, 1_000);
    assert_eq!(balance(&ledger, b).await, 0);
    assert_eq!(ledger.history(a, 1, 10).await.unwrap().total, 1);
    assert_eq!(ledger.history(b, 1, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_validation_errors() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;

    assert!(matches!(ledger.fund(a, 0, "z").await, Err(Error::InvalidAmount(0))));
    assert!(matches!(
        ledger.transfer(a, a, 100, "r2").await,
        Err(Error::SameAccount)
    ));
    assert!(matches!(
        ledger.fund(OwnerId::new(), 100, "ghost").await,
        Err(Error::AccountNotFound(_))
    ));
    assert_eq!(ledger.history(a, 1, 10).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_one_account_per_owner() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;

    let result = ledger.create_account(a).await;
    assert!(matches!(result, Err(Error::AccountAlreadyExists(owner)) if owner == a));
}

#[tokio::test]
async fn test_history_paging() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;
    let b = open_owner(&ledger).await;

    for i in 0..12 {
        ledger.fund(a, 100, &format!("f{}", i)).await.unwrap();
    }
    ledger.fund(b, 50, "fb").await.unwrap();
    ledger.transfer(b, a, 50, "tb").await.unwrap();

    // Defaults: page 1, size 10
    let first = ledger.history(a, 0, 0).await.unwrap();
    assert_eq!(first.total, 13);
    assert_eq!(first.page, 1);
    assert_eq!(first.page_size, 10);
    assert_eq!(first.entries.len(), 10);
    assert_eq!(first.entries[0].reference, "tb");

    let second = ledger.history(a, 2, 10).await.unwrap();
    assert_eq!(second.entries.len(), 3);
    assert_eq!(second.entries.last().unwrap().reference, "f0");

    let capped = ledger.history(a, 1, 1_000).await.unwrap();
    assert_eq!(capped.page_size, 100);
    assert_eq!(capped.entries.len(), 13);

    let beyond = ledger.history(a, 5, 10).await.unwrap();
    assert!(beyond.entries.is_empty());
    assert_eq!(beyond.total, 13);

    // The inbound transfer appears in the sender's history too
    let sender = ledger.history(b, 1, 10).await.unwrap();
    assert_eq!(sender.total, 2);
    assert_eq!(sender.entries[0].reference, "tb");
}

#[tokio::test]
async fn test_history_ordered_newest_first() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;

    for i in 0..5 {
        ledger.fund(a, 10, &format!("f{}", i)).await.unwrap();
    }

    let page = ledger.history(a, 1, 10).await.unwrap();
    assert!(page
        .entries
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));
}

#[tokio::test]
async fn test_drift_is_reported_not_corrected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    let owner = {
        let ledger = Ledger::open(config.clone()).await.unwrap();
        let owner = open_owner(&ledger).await;
        ledger.fund(owner, 1_000, "f1").await.unwrap();
        owner
    };

    // Edit the stored balance behind the ledger's back
    let tampered = {
        let opts = rocksdb::Options::default();
        let db = rocksdb::DB::open_cf(
            &opts,
            &config.data_dir,
            ["accounts", "owners", "entries", "references", "account_entries"],
        )
        .unwrap();
        let cf = db.cf_handle("accounts").unwrap();
        let (key, value) = db
            .iterator_cf(&cf, rocksdb::IteratorMode::Start)
            .next()
            .unwrap()
            .unwrap();
        let mut account: Account = bincode::deserialize(&value).unwrap();
        account.balance = 1_250;
        db.put_cf(&cf, key, bincode::serialize(&account).unwrap())
            .unwrap();
        account
    };
    assert_eq!(tampered.owner_id, owner);

    let ledger = Ledger::open(config).await.unwrap();
    let results = ledger.reconcile().await.unwrap();

    assert_eq!(count_mismatches(&results), 1);
    assert_eq!(results[0].stored_balance, 1_250);
    assert_eq!(results[0].calculated_balance, 1_000);
    assert_eq!(results[0].difference, 250);
    assert_eq!(ledger.metrics().reconciliation_mismatches.get(), 1);
    assert_eq!(balance(&ledger, owner).await, 1_250);
}

#[tokio::test]
async fn test_undecodable_account_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    let (healthy, corrupt) = {
        let ledger = Ledger::open(config.clone()).await.unwrap();
        let a = open_owner(&ledger).await;
        let b = open_owner(&ledger).await;
        ledger.fund(a, 700, "fa").await.unwrap();
        ledger.fund(b, 300, "fb").await.unwrap();
        (
            ledger.account(a).await.unwrap(),
            ledger.account(b).await.unwrap(),
        )
    };

    {
        let opts = rocksdb::Options::default();
        let db = rocksdb::DB::open_cf(
            &opts,
            &config.data_dir,
            ["accounts", "owners", "entries", "references", "account_entries"],
        )
        .unwrap();
        let cf = db.cf_handle("accounts").unwrap();
        db.put_cf(&cf, corrupt.account_id.as_bytes(), b"garbage")
            .unwrap();
    }

    let ledger = Ledger::open(config).await.unwrap();
    let results = ledger.reconcile().await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].account_id, healthy.account_id);
    assert_eq!(results[0].stored_balance, 700);
    assert!(!results[0].has_mismatch);
}
