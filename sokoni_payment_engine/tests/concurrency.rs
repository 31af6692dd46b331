//! Concurrent delivery tests: the ledger must produce the same final state whatever the interleaving.
mod support;

use spg_common::Money;
use sokoni_payment_engine::{
    db_types::{TransactionStatus, TransactionType},
    eversend_types::PaymentEvent,
    ApplyResult, EventOrigin, LedgerApi, SqliteDatabase,
};
use support::{prepare_test_env, random_db_path};

fn deposit(reference: &str, owner: &str, amount: Money) -> PaymentEvent {
    PaymentEvent {
        external_reference: reference.to_string(),
        provider_id: None,
        owner_id: owner.to_string(),
        transaction_type: TransactionType::Deposit,
        amount,
        currency: "UGX".to_string(),
        country: "UG".to_string(),
        charges: Money::default(),
        account_number: String::new(),
        status: TransactionStatus::Completed,
        beneficiary: None,
    }
}

async fn new_api() -> LedgerApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database");
    LedgerApi::new(db)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_on_one_wallet_both_land() {
    let api = new_api().await;
    let a = deposit("tx-conc-a", "user-1", Money::from_major(700));
    let b = deposit("tx-conc-b", "user-1", Money::from_major(300));

    let api_a = api.clone();
    let api_b = api.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { api_a.apply(&a, &EventOrigin::system()).await }),
        tokio::spawn(async move { api_b.apply(&b, &EventOrigin::system()).await }),
    );
    assert!(matches!(ra.unwrap().unwrap(), ApplyResult::Applied { .. }));
    assert!(matches!(rb.unwrap().unwrap(), ApplyResult::Applied { .. }));

    assert_eq!(api.balance("user-1", "UGX").await.unwrap(), Money::from_major(1_000));
    assert!(api.transaction_by_reference("tx-conc-a").await.unwrap().is_some());
    assert!(api.transaction_by_reference("tx-conc-b").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_delivery_applies_once() {
    let api = new_api().await;
    let event = deposit("tx-dup", "user-2", Money::from_major(100));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let api = api.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move { api.apply(&event, &EventOrigin::system()).await }));
    }
    let mut applied = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ApplyResult::Applied { .. } => applied += 1,
            ApplyResult::Duplicate { .. } => duplicates += 1,
            other => panic!("Unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(api.balance("user-2", "UGX").await.unwrap(), Money::from_major(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deposits_on_different_wallets_do_not_interfere() {
    let api = new_api().await;
    let mut handles = Vec::new();
    for i in 0..10 {
        let api = api.clone();
        let owner = format!("user-{}", i % 5);
        let event = deposit(&format!("tx-par-{i}"), &owner, Money::from_major(10));
        handles.push(tokio::spawn(async move { api.apply(&event, &EventOrigin::system()).await }));
    }
    for handle in handles {
        assert!(matches!(handle.await.unwrap().unwrap(), ApplyResult::Applied { .. }));
    }
    for i in 0..5 {
        let owner = format!("user-{i}");
        assert_eq!(api.balance(&owner, "UGX").await.unwrap(), Money::from_major(20));
    }
}
