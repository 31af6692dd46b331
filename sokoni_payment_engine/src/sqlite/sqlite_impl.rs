//! `SqliteDatabase` is a concrete implementation of the payment ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`] module.
use std::fmt::Debug;

use log::*;
use spg_common::Money;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{audit, commissions, db_url, earnings, new_pool, transactions, wallets};
use crate::{
    db_types::{AuditEntry, Commission, Earning, NewAuditEntry, NewTransaction, Transaction, TransactionStatus,
        TransactionType, Wallet},
    eversend_types::PaymentEvent,
    traits::{ApplyResult, LedgerError, PaymentLedgerDatabase, RejectReason},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool reading the URL from the `SPG_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_wallet(&self, owner_id: &str, currency: &str) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(owner_id, currency, &mut conn).await
    }

    async fn fetch_or_create_wallet(&self, owner_id: &str, currency: &str) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_or_create_wallet(owner_id, currency, &mut conn).await
    }

    async fn fetch_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_by_reference(reference, &mut conn).await
    }

    async fn fetch_commission_for_transaction(&self, transaction_id: i64) -> Result<Option<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_for_transaction(transaction_id, &mut conn).await
    }

    async fn fetch_earnings_for_transaction(&self, transaction_id: i64) -> Result<Vec<Earning>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        earnings::fetch_for_transaction(transaction_id, &mut conn).await
    }

    /// Takes a validated payment event and, in a single atomic transaction,
    /// * resolves (or creates) the target wallet,
    /// * applies the event exactly once, keyed on `external_reference`,
    /// * records commission and earnings when the transaction completes.
    ///
    /// Everything commits together or not at all. If another handler won the insert race despite the caller's
    /// wallet lock, the unique constraint on `external_reference` resolves the event to a duplicate.
    async fn apply_event(&self, event: &PaymentEvent, rate_bps: i64) -> Result<ApplyResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::fetch_or_create_wallet(&event.owner_id, &event.currency, &mut tx).await?;
        let result = match transactions::fetch_by_reference(&event.external_reference, &mut tx).await? {
            Some(existing) => apply_transition(existing, event, &wallet, rate_bps, &mut tx).await,
            None => apply_first_sight(event, &wallet, rate_bps, &mut tx).await,
        };
        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            },
            Err(LedgerError::TransactionAlreadyExists(reference)) => {
                tx.rollback().await?;
                debug!("🗃️ Event [{reference}] raced a concurrent delivery. Resolving as duplicate.");
                Ok(ApplyResult::Duplicate { reference })
            },
            Err(e) => Err(e),
        }
    }

    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        audit::insert(entry, &mut conn).await
    }

    async fn fetch_audit_entries_for_actor(&self, actor: &str) -> Result<Vec<AuditEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_for_actor(actor, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

fn new_transaction(event: &PaymentEvent, wallet_id: i64, status: TransactionStatus) -> NewTransaction {
    NewTransaction {
        external_reference: event.external_reference.clone(),
        provider_id: event.provider_id.clone(),
        wallet_id,
        transaction_type: event.transaction_type,
        amount: event.amount,
        currency: event.currency.clone(),
        country: event.country.clone(),
        charges: event.charges,
        account_number: event.account_number.clone(),
        status,
    }
}

fn commission_amount(amount: Money, rate_bps: i64) -> Money {
    Money::from_cents(amount.value() * rate_bps / 10_000)
}

/// First delivery of this `external_reference`: insert the transaction and apply balance effects.
///
/// Deposits only move money once they complete. Live withdrawals reserve `amount + charges` up front, so the funds
/// cannot be double-spent while the provider settles. Transfers move funds between both wallets when they complete.
async fn apply_first_sight(
    event: &PaymentEvent,
    wallet: &Wallet,
    rate_bps: i64,
    conn: &mut SqliteConnection,
) -> Result<ApplyResult, LedgerError> {
    use TransactionType::*;
    match event.transaction_type {
        Deposit => {
            let transaction = transactions::idempotent_insert(new_transaction(event, wallet.id, event.status), &mut *conn).await?;
            let mut new_balance = wallet.balance;
            if event.status == TransactionStatus::Completed {
                new_balance = wallets::adjust_balance(wallet.id, event.amount, &mut *conn).await?;
                record_completion_artifacts(&transaction, event, rate_bps, &mut *conn).await?;
            }
            debug!("🗃️ Deposit [{}] recorded as {}. Balance: {new_balance}", event.external_reference, event.status);
            Ok(ApplyResult::Applied { transaction, new_balance })
        },
        Withdraw => {
            // Only live withdrawals reserve funds; a first sight that is already failed or reversed records
            // history without touching the balance.
            if !matches!(event.status, TransactionStatus::Pending | TransactionStatus::Completed) {
                let transaction = transactions::idempotent_insert(new_transaction(event, wallet.id, event.status), &mut *conn).await?;
                return Ok(ApplyResult::Applied { transaction, new_balance: wallet.balance });
            }
            let reserved = event.amount + event.charges;
            if wallet.balance < reserved {
                warn!(
                    "🗃️ Withdrawal [{}] of {reserved} exceeds balance {} for wallet #{}. Rejecting.",
                    event.external_reference, wallet.balance, wallet.id
                );
                let transaction = transactions::idempotent_insert(
                    new_transaction(event, wallet.id, TransactionStatus::Failed),
                    &mut *conn,
                )
                .await?;
                return Ok(ApplyResult::Rejected { transaction, reason: RejectReason::InsufficientBalance });
            }
            let transaction = transactions::idempotent_insert(new_transaction(event, wallet.id, event.status), &mut *conn).await?;
            let new_balance = wallets::adjust_balance(wallet.id, -reserved, &mut *conn).await?;
            if event.status == TransactionStatus::Completed {
                record_completion_artifacts(&transaction, event, rate_bps, &mut *conn).await?;
            }
            debug!(
                "🗃️ Withdrawal [{}] reserved {reserved} as {}. Balance: {new_balance}",
                event.external_reference, event.status
            );
            Ok(ApplyResult::Applied { transaction, new_balance })
        },
        Transfer => {
            if event.status != TransactionStatus::Completed {
                let transaction = transactions::idempotent_insert(new_transaction(event, wallet.id, event.status), &mut *conn).await?;
                return Ok(ApplyResult::Applied { transaction, new_balance: wallet.balance });
            }
            let total = event.amount + event.charges;
            if wallet.balance < total {
                warn!(
                    "🗃️ Transfer [{}] of {total} exceeds balance {} for wallet #{}. Rejecting.",
                    event.external_reference, wallet.balance, wallet.id
                );
                let transaction = transactions::idempotent_insert(
                    new_transaction(event, wallet.id, TransactionStatus::Failed),
                    &mut *conn,
                )
                .await?;
                return Ok(ApplyResult::Rejected { transaction, reason: RejectReason::InsufficientBalance });
            }
            let destination =
                wallets::fetch_or_create_wallet(&event.account_number, &event.currency, &mut *conn).await?;
            let transaction = transactions::idempotent_insert(new_transaction(event, wallet.id, event.status), &mut *conn).await?;
            let new_balance = wallets::adjust_balance(wallet.id, -total, &mut *conn).await?;
            wallets::adjust_balance(destination.id, event.amount, &mut *conn).await?;
            record_completion_artifacts(&transaction, event, rate_bps, &mut *conn).await?;
            debug!(
                "🗃️ Transfer [{}] moved {} from wallet #{} to wallet #{}",
                event.external_reference, event.amount, wallet.id, destination.id
            );
            Ok(ApplyResult::Applied { transaction, new_balance })
        },
    }
}

/// The reference already exists: either the event carries a legal status transition, or it is a redelivery and
/// resolves to a no-op duplicate.
async fn apply_transition(
    existing: Transaction,
    event: &PaymentEvent,
    wallet: &Wallet,
    rate_bps: i64,
    conn: &mut SqliteConnection,
) -> Result<ApplyResult, LedgerError> {
    use TransactionStatus::*;
    match (existing.status, event.status) {
        (Pending, Completed) => complete_pending(existing, event, wallet, rate_bps, conn).await,
        (Pending, Failed) => fail_pending(existing, event, wallet, conn).await,
        (Completed, Reversed) => reverse_completed(existing, event, wallet, conn).await,
        // The provider reports a payout that bounced after settlement as failed; that is a reversal for us.
        (Completed, Failed) if existing.transaction_type == TransactionType::Withdraw => {
            reverse_completed(existing, event, wallet, conn).await
        },
        (from, to) => {
            debug!(
                "🗃️ Event [{}] would move transaction from {from} to {to}; no such transition. Duplicate delivery.",
                event.external_reference
            );
            Ok(ApplyResult::Duplicate { reference: event.external_reference.clone() })
        },
    }
}

async fn complete_pending(
    existing: Transaction,
    event: &PaymentEvent,
    wallet: &Wallet,
    rate_bps: i64,
    conn: &mut SqliteConnection,
) -> Result<ApplyResult, LedgerError> {
    use TransactionType::*;
    let mut new_balance = wallet.balance;
    match existing.transaction_type {
        // The money only arrives on settlement.
        Deposit => {
            new_balance = wallets::adjust_balance(wallet.id, existing.amount, &mut *conn).await?;
        },
        // The reservation was taken when the withdrawal was recorded.
        Withdraw => {},
        Transfer => {
            let total = existing.amount + existing.charges;
            if wallet.balance < total {
                warn!(
                    "🗃️ Transfer [{}] settled for {total} but wallet #{} only holds {}. Rejecting.",
                    existing.external_reference, wallet.id, wallet.balance
                );
                let transaction = transactions::update_status(
                    existing.id,
                    TransactionStatus::Failed,
                    event.provider_id.as_deref(),
                    &mut *conn,
                )
                .await?;
                return Ok(ApplyResult::Rejected { transaction, reason: RejectReason::InsufficientBalance });
            }
            let destination =
                wallets::fetch_or_create_wallet(&existing.account_number, &existing.currency, &mut *conn).await?;
            new_balance = wallets::adjust_balance(wallet.id, -total, &mut *conn).await?;
            wallets::adjust_balance(destination.id, existing.amount, &mut *conn).await?;
        },
    }
    let transaction =
        transactions::update_status(existing.id, TransactionStatus::Completed, event.provider_id.as_deref(), &mut *conn)
            .await?;
    record_completion_artifacts(&transaction, event, rate_bps, &mut *conn).await?;
    debug!("🗃️ Transaction [{}] settled. Balance: {new_balance}", transaction.external_reference);
    Ok(ApplyResult::Applied { transaction, new_balance })
}

async fn fail_pending(
    existing: Transaction,
    event: &PaymentEvent,
    wallet: &Wallet,
    conn: &mut SqliteConnection,
) -> Result<ApplyResult, LedgerError> {
    let mut new_balance = wallet.balance;
    // A failed withdrawal releases its reservation. Pending deposits and transfers never moved money.
    if existing.transaction_type == TransactionType::Withdraw {
        let reserved = existing.amount + existing.charges;
        new_balance = wallets::adjust_balance(wallet.id, reserved, &mut *conn).await?;
        debug!("🗃️ Withdrawal [{}] failed. Refunded reservation of {reserved}", existing.external_reference);
    }
    let transaction =
        transactions::update_status(existing.id, TransactionStatus::Failed, event.provider_id.as_deref(), &mut *conn)
            .await?;
    Ok(ApplyResult::Applied { transaction, new_balance })
}

/// Undo a completed transaction's balance delta and mark it reversed. Commissions and earnings are immutable and
/// stay in place; the audit trail records the reversal.
async fn reverse_completed(
    existing: Transaction,
    event: &PaymentEvent,
    wallet: &Wallet,
    conn: &mut SqliteConnection,
) -> Result<ApplyResult, LedgerError> {
    use TransactionType::*;
    let mut new_balance = wallet.balance;
    match existing.transaction_type {
        Deposit => {
            // Reversing a deposit claws the money back; the wallet may not go negative.
            if wallet.balance < existing.amount {
                warn!(
                    "🗃️ Reversal of deposit [{}] needs {} but wallet #{} only holds {}. Rejecting.",
                    existing.external_reference, existing.amount, wallet.id, wallet.balance
                );
                return Ok(ApplyResult::Rejected { transaction: existing, reason: RejectReason::InsufficientBalance });
            }
            new_balance = wallets::adjust_balance(wallet.id, -existing.amount, &mut *conn).await?;
        },
        Withdraw => {
            let reserved = existing.amount + existing.charges;
            new_balance = wallets::adjust_balance(wallet.id, reserved, &mut *conn).await?;
        },
        Transfer => {
            let destination =
                wallets::fetch_or_create_wallet(&existing.account_number, &existing.currency, &mut *conn).await?;
            if destination.balance < existing.amount {
                warn!(
                    "🗃️ Reversal of transfer [{}] needs {} from wallet #{} which only holds {}. Rejecting.",
                    existing.external_reference, existing.amount, destination.id, destination.balance
                );
                return Ok(ApplyResult::Rejected { transaction: existing, reason: RejectReason::InsufficientBalance });
            }
            wallets::adjust_balance(destination.id, -existing.amount, &mut *conn).await?;
            new_balance = wallets::adjust_balance(wallet.id, existing.amount + existing.charges, &mut *conn).await?;
        },
    }
    let transaction =
        transactions::update_status(existing.id, TransactionStatus::Reversed, event.provider_id.as_deref(), &mut *conn)
            .await?;
    info!("🗃️ Transaction [{}] reversed. Balance: {new_balance}", transaction.external_reference);
    Ok(ApplyResult::Applied { transaction, new_balance })
}

/// Commission and earning rows that exist for every completed transaction. A completed payout also settles the
/// beneficiary's pending earnings, this payout's own earning included.
async fn record_completion_artifacts(
    transaction: &Transaction,
    event: &PaymentEvent,
    rate_bps: i64,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let commission = commission_amount(transaction.amount, rate_bps);
    commissions::insert_for_transaction(transaction.id, commission, rate_bps, &mut *conn).await?;
    if let Some(beneficiary) = &event.beneficiary {
        earnings::insert(transaction.id, beneficiary, transaction.charges, &mut *conn).await?;
        if transaction.transaction_type == TransactionType::Withdraw {
            earnings::settle_for_beneficiary(beneficiary, &mut *conn).await?;
        }
    }
    Ok(())
}
