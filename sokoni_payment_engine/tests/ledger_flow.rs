mod support;

use spg_common::Money;
use sokoni_payment_engine::{
    db_types::{EarningStatus, TransactionStatus, TransactionType},
    eversend_types::PaymentEvent,
    ApplyResult, EventOrigin, LedgerApi, RejectReason, SqliteDatabase,
};
use support::{prepare_test_env, random_db_path};

fn deposit(reference: &str, owner: &str, amount: Money, status: TransactionStatus) -> PaymentEvent {
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
        status,
        beneficiary: None,
    }
}

fn withdraw(reference: &str, owner: &str, amount: Money, charges: Money, status: TransactionStatus) -> PaymentEvent {
    PaymentEvent {
        external_reference: reference.to_string(),
        provider_id: None,
        owner_id: owner.to_string(),
        transaction_type: TransactionType::Withdraw,
        amount,
        currency: "UGX".to_string(),
        country: "UG".to_string(),
        charges,
        account_number: "256700000000".to_string(),
        status,
        beneficiary: None,
    }
}

async fn new_api() -> LedgerApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database");
    LedgerApi::new(db)
}

#[tokio::test]
async fn deposit_end_to_end_with_redelivery() {
    let api = new_api().await;
    let event = deposit("tx-100", "user-1", Money::from_major(10_000), TransactionStatus::Completed);

    let result = api.apply(&event, &EventOrigin::system()).await.expect("apply failed");
    let ApplyResult::Applied { transaction, new_balance } = result else {
        panic!("Expected Applied, got {result:?}");
    };
    assert_eq!(new_balance, Money::from_major(10_000));
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.external_reference, "tx-100");
    assert_eq!(api.balance("user-1", "UGX").await.unwrap(), Money::from_major(10_000));

    let audit = api.audit().entries_for_actor("system").await.unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].action.contains("tx-100"));

    // Redelivering the identical payload must change nothing.
    let result = api.apply(&event, &EventOrigin::system()).await.expect("redelivery failed");
    assert!(matches!(result, ApplyResult::Duplicate { .. }));
    assert_eq!(api.balance("user-1", "UGX").await.unwrap(), Money::from_major(10_000));
}

#[tokio::test]
async fn repeated_application_is_idempotent() {
    let api = new_api().await;
    let mut event = deposit("tx-repeat", "user-2", Money::from_major(500), TransactionStatus::Completed);
    event.charges = Money::from_major(5);
    event.beneficiary = Some("vendor-9".to_string());

    let mut applied = 0;
    for _ in 0..4 {
        match api.apply(&event, &EventOrigin::system()).await.unwrap() {
            ApplyResult::Applied { .. } => applied += 1,
            ApplyResult::Duplicate { .. } => {},
            other => panic!("Unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(api.balance("user-2", "UGX").await.unwrap(), Money::from_major(500));

    let tx = api.transaction_by_reference("tx-repeat").await.unwrap().expect("transaction missing");
    let commission = api.commission_for_transaction(tx.id).await.unwrap();
    assert!(commission.is_some());
    let earnings = api.earnings_for_transaction(tx.id).await.unwrap();
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].amount, Money::from_major(5));
    assert_eq!(earnings[0].status, EarningStatus::Pending);
}

#[tokio::test]
async fn withdrawal_exceeding_balance_is_rejected() {
    let api = new_api().await;
    let funding = deposit("tx-fund-1", "user-3", Money::from_major(100), TransactionStatus::Completed);
    api.apply(&funding, &EventOrigin::system()).await.unwrap();

    // 95 + 10 in charges exceeds the balance of 100.
    let event =
        withdraw("tx-overdraw", "user-3", Money::from_major(95), Money::from_major(10), TransactionStatus::Pending);
    let result = api.apply(&event, &EventOrigin::system()).await.unwrap();
    let ApplyResult::Rejected { transaction, reason } = result else {
        panic!("Expected Rejected, got {result:?}");
    };
    assert_eq!(reason, RejectReason::InsufficientBalance);
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(api.balance("user-3", "UGX").await.unwrap(), Money::from_major(100));
}

#[tokio::test]
async fn pending_deposit_settles_on_completion() {
    let api = new_api().await;
    let pending = deposit("tx-settle", "user-4", Money::from_major(250), TransactionStatus::Pending);
    api.apply(&pending, &EventOrigin::system()).await.unwrap();
    assert_eq!(api.balance("user-4", "UGX").await.unwrap(), Money::default());

    let mut completed = pending.clone();
    completed.status = TransactionStatus::Completed;
    completed.provider_id = Some("ev-1234".to_string());
    let result = api.apply(&completed, &EventOrigin::system()).await.unwrap();
    let ApplyResult::Applied { transaction, new_balance } = result else {
        panic!("Expected Applied, got {result:?}");
    };
    assert_eq!(new_balance, Money::from_major(250));
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.provider_id.as_deref(), Some("ev-1234"));

    // A third delivery of the settled event is a no-op.
    let result = api.apply(&completed, &EventOrigin::system()).await.unwrap();
    assert!(matches!(result, ApplyResult::Duplicate { .. }));
    assert_eq!(api.balance("user-4", "UGX").await.unwrap(), Money::from_major(250));
}

#[tokio::test]
async fn failed_withdrawal_releases_its_reservation() {
    let api = new_api().await;
    let funding = deposit("tx-fund-2", "user-5", Money::from_major(1_000), TransactionStatus::Completed);
    api.apply(&funding, &EventOrigin::system()).await.unwrap();

    let pending =
        withdraw("tx-payout-1", "user-5", Money::from_major(200), Money::from_major(10), TransactionStatus::Pending);
    api.apply(&pending, &EventOrigin::system()).await.unwrap();
    assert_eq!(api.balance("user-5", "UGX").await.unwrap(), Money::from_major(790));

    let mut failed = pending.clone();
    failed.status = TransactionStatus::Failed;
    let result = api.apply(&failed, &EventOrigin::system()).await.unwrap();
    let ApplyResult::Applied { transaction, new_balance } = result else {
        panic!("Expected Applied, got {result:?}");
    };
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(new_balance, Money::from_major(1_000));
}

#[tokio::test]
async fn completed_deposit_can_be_reversed() {
    let api = new_api().await;
    let event = deposit("tx-rev", "user-6", Money::from_major(300), TransactionStatus::Completed);
    api.apply(&event, &EventOrigin::system()).await.unwrap();
    assert_eq!(api.balance("user-6", "UGX").await.unwrap(), Money::from_major(300));

    let mut reversal = event.clone();
    reversal.status = TransactionStatus::Reversed;
    let result = api.apply(&reversal, &EventOrigin::system()).await.unwrap();
    let ApplyResult::Applied { transaction, new_balance } = result else {
        panic!("Expected Applied, got {result:?}");
    };
    assert_eq!(transaction.status, TransactionStatus::Reversed);
    assert_eq!(new_balance, Money::default());

    // Reversing twice is a duplicate, not a second refund.
    let result = api.apply(&reversal, &EventOrigin::system()).await.unwrap();
    assert!(matches!(result, ApplyResult::Duplicate { .. }));
}

#[tokio::test]
async fn completed_transfer_moves_funds_between_wallets() {
    let api = new_api().await;
    let funding = deposit("tx-fund-3", "alice", Money::from_major(1_000), TransactionStatus::Completed);
    api.apply(&funding, &EventOrigin::system()).await.unwrap();

    let transfer = PaymentEvent {
        external_reference: "tx-transfer-1".to_string(),
        provider_id: None,
        owner_id: "alice".to_string(),
        transaction_type: TransactionType::Transfer,
        amount: Money::from_major(300),
        currency: "UGX".to_string(),
        country: "UG".to_string(),
        charges: Money::from_major(5),
        account_number: "bob".to_string(),
        status: TransactionStatus::Completed,
        beneficiary: None,
    };
    let result = api.apply(&transfer, &EventOrigin::system()).await.unwrap();
    assert!(matches!(result, ApplyResult::Applied { .. }));
    assert_eq!(api.balance("alice", "UGX").await.unwrap(), Money::from_major(695));
    assert_eq!(api.balance("bob", "UGX").await.unwrap(), Money::from_major(300));
}

#[tokio::test]
async fn commission_uses_the_configured_rate() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database");
    // 100 bps = 1%
    let api = LedgerApi::new(db).with_commission_rate(100);

    let event = deposit("tx-comm", "user-7", Money::from_major(10_000), TransactionStatus::Completed);
    let result = api.apply(&event, &EventOrigin::system()).await.unwrap();
    let ApplyResult::Applied { transaction, .. } = result else {
        panic!("Expected Applied, got {result:?}");
    };
    let commission = api.commission_for_transaction(transaction.id).await.unwrap().expect("commission missing");
    assert_eq!(commission.amount, Money::from_major(100));
    assert_eq!(commission.rate_bps, 100);
}

#[tokio::test]
async fn completed_payout_settles_pending_earnings() {
    let api = new_api().await;
    let mut funding = deposit("tx-fund-4", "vendor-1", Money::from_major(1_000), TransactionStatus::Completed);
    funding.charges = Money::from_major(20);
    funding.beneficiary = Some("vendor-1".to_string());
    api.apply(&funding, &EventOrigin::system()).await.unwrap();

    let deposit_tx = api.transaction_by_reference("tx-fund-4").await.unwrap().unwrap();
    let earnings = api.earnings_for_transaction(deposit_tx.id).await.unwrap();
    assert_eq!(earnings[0].status, EarningStatus::Pending);

    let mut payout =
        withdraw("tx-payout-2", "vendor-1", Money::from_major(500), Money::from_major(10), TransactionStatus::Completed);
    payout.beneficiary = Some("vendor-1".to_string());
    api.apply(&payout, &EventOrigin::system()).await.unwrap();

    let earnings = api.earnings_for_transaction(deposit_tx.id).await.unwrap();
    assert_eq!(earnings[0].status, EarningStatus::Paid);
    let payout_tx = api.transaction_by_reference("tx-payout-2").await.unwrap().unwrap();
    let payout_earnings = api.earnings_for_transaction(payout_tx.id).await.unwrap();
    assert!(payout_earnings.iter().all(|e| e.status == EarningStatus::Paid));
}
