//! Concurrent callers against one ledger
//!
//! All tests run on a multi-threaded runtime so store work really overlaps
//! on the blocking pool.

use std::time::Duration;
use tempfile::TempDir;
use wallet_ledger::{reconciliation::count_mismatches, Config, Ledger, OwnerId};

async fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    // Generous budget: these tests measure correctness, not contention limits
    config.retry.max_attempts = 50;
    config.retry.initial_backoff_ms = 1;

    (Ledger::open(config).await.unwrap(), temp_dir)
}

async fn open_owner(ledger: &Ledger) -> OwnerId {
    let owner = OwnerId::new();
    ledger.create_account(owner).await.unwrap();
    owner
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_fund_applies_once() {
    let (ledger, _temp) = create_test_ledger().await;
    let owner = open_owner(&ledger).await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            ledger.fund(owner, 5_000, "r1").await
        }));
    }

    let mut entry_ids = Vec::new();
    for task in tasks {
        entry_ids.push(task.await.unwrap().unwrap().entry_id);
    }

    entry_ids.dedup();
    assert_eq!(entry_ids.len(), 1);
    assert_eq!(ledger.account(owner).await.unwrap().balance, 5_000);
    assert_eq!(ledger.history(owner, 1, 10).await.unwrap().total, 1);
    assert_eq!(ledger.metrics().replayed_references.get(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;
    let b = open_owner(&ledger).await;
    ledger.fund(a, 100_000, "fa").await.unwrap();
    ledger.fund(b, 100_000, "fb").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                ledger.transfer(a, b, 10, &format!("ab-{}", i)).await
            } else {
                ledger.transfer(b, a, 10, &format!("ba-{}", i)).await
            }
        }));
    }

    let all = async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(30), all)
        .await
        .expect("opposite transfers deadlocked");

    let balance_a = ledger.account(a).await.unwrap().balance;
    let balance_b = ledger.account(b).await.unwrap().balance;
    assert_eq!(balance_a, 100_000);
    assert_eq!(balance_b, 100_000);
    assert_eq!(count_mismatches(&ledger.reconcile().await.unwrap()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_writers_conserve_value() {
    let (ledger, _temp) = create_test_ledger().await;

    let mut owners = Vec::new();
    for i in 0..5 {
        let owner = open_owner(&ledger).await;
        ledger.fund(owner, 10_000, &format!("seed-{}", i)).await.unwrap();
        owners.push(owner);
    }
    let total_before = 50_000;

    let mut tasks = Vec::new();
    for i in 0..100usize {
        let ledger = ledger.clone();
        let source = owners[i % owners.len()];
        let destination = owners[(i * 3 + 1) % owners.len()];
        tasks.push(tokio::spawn(async move {
            if source == destination {
                return Ok(None);
            }
            let amount = (i as i64 % 7 + 1) * 100;
            ledger
                .transfer(source, destination, amount, &format!("t-{}", i))
                .await
                .map(Some)
        }));
    }

    for task in tasks {
        // Overdraws are legitimate rejections; anything else is a failure
        match task.await.unwrap() {
            Ok(_) | Err(wallet_ledger::Error::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let mut total_after = 0;
    for owner in &owners {
        let balance = ledger.account(*owner).await.unwrap().balance;
        assert!(balance >= 0);
        total_after += balance;
    }
    assert_eq!(total_after, total_before);

    let results = ledger.reconcile().await.unwrap();
    assert_eq!(results.len(), owners.len());
    assert_eq!(count_mismatches(&results), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let (ledger, _temp) = create_test_ledger().await;
    let owner = open_owner(&ledger).await;
    ledger.fund(owner, 1_000, "f1").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            ledger.withdraw(owner, 100, &format!("w-{}", i)).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(ledger.account(owner).await.unwrap().balance, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_alongside_writers() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = open_owner(&ledger).await;
    let b = open_owner(&ledger).await;
    ledger.fund(a, 50_000, "fa").await.unwrap();

    let writer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for i in 0..40 {
                ledger.transfer(a, b, 25, &format!("t-{}", i)).await.unwrap();
            }
        })
    };

    for _ in 0..5 {
        let results = ledger.reconcile().await.unwrap();
        assert_eq!(count_mismatches(&results), 0);
    }

    writer.await.unwrap();
    assert_eq!(ledger.account(b).await.unwrap().balance, 1_000);
}
