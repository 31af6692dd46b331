use std::fmt::Display;

use spg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{AuditEntry, Commission, Earning, NewAuditEntry, Transaction, Wallet},
    eversend_types::PaymentEvent,
};

/// This trait defines the behaviour of storage backends supporting the payment ledger.
///
/// The one non-negotiable contract is [`PaymentLedgerDatabase::apply_event`]: every balance effect, status
/// transition, commission and earning for a single event must land in one atomic unit of work, or not at all.
/// Callers provide the per-wallet serialization (see the ledger API); the backend provides atomicity and the
/// uniqueness constraints on `external_reference` and `(owner_id, currency)`.
#[allow(async_fn_in_trait)]
pub trait PaymentLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Fetch the wallet for the given owner and currency, if it exists.
    async fn fetch_wallet(&self, owner_id: &str, currency: &str) -> Result<Option<Wallet>, LedgerError>;

    /// Fetch the wallet for the given owner and currency, creating an empty one if it does not exist yet.
    async fn fetch_or_create_wallet(&self, owner_id: &str, currency: &str) -> Result<Wallet, LedgerError>;

    /// Fetch a transaction by its provider-supplied external reference.
    async fn fetch_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>, LedgerError>;

    /// Fetch the commission derived from the given transaction, if one was created.
    async fn fetch_commission_for_transaction(&self, transaction_id: i64) -> Result<Option<Commission>, LedgerError>;

    /// Fetch all earnings linked to the given transaction.
    async fn fetch_earnings_for_transaction(&self, transaction_id: i64) -> Result<Vec<Earning>, LedgerError>;

    /// Apply a validated payment event to the ledger in a single atomic unit of work.
    ///
    /// * The event's wallet is created if this is the first reference to its (owner, currency) pair.
    /// * If a transaction with the event's `external_reference` already exists and the event carries no legal
    ///   status transition for it, nothing is changed and [`ApplyResult::Duplicate`] is returned.
    /// * Deposits credit the wallet when they complete. Withdrawals debit `amount + charges` when first recorded
    ///   (funds are reserved while the provider settles) and refund it if they fail. Transfers move funds between
    ///   two wallets when they complete.
    /// * A withdrawal or transfer without sufficient funds is recorded as a failed transaction and reported as
    ///   [`ApplyResult::Rejected`]; the balance is untouched.
    /// * On transition to completed, a commission of `amount * rate_bps / 10_000` is recorded, an earning is
    ///   created when the event names a beneficiary, and a completed payout settles that beneficiary's pending
    ///   earnings.
    /// * A reversal event against a completed transaction undoes its balance delta and marks it reversed.
    ///
    /// The caller must hold the serialization locks for every wallet the event touches.
    async fn apply_event(&self, event: &PaymentEvent, rate_bps: i64) -> Result<ApplyResult, LedgerError>;

    /// Append an entry to the audit log.
    async fn insert_audit_entry(&self, entry: NewAuditEntry) -> Result<(), LedgerError>;

    /// Fetch audit entries recorded for the given actor, newest first.
    async fn fetch_audit_entries_for_actor(&self, actor: &str) -> Result<Vec<AuditEntry>, LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// The outcome of applying one payment event.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    /// The event took effect. `new_balance` is the event's primary wallet balance after commit.
    Applied { transaction: Transaction, new_balance: Money },
    /// A transaction with this reference has already been applied; nothing was changed.
    Duplicate { reference: String },
    /// The event was rejected by a business rule. The transaction records the rejection; no balance changed.
    Rejected { transaction: Transaction, reason: RejectReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientBalance,
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientBalance => write!(f, "Insufficient balance"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert transaction, since it already exists with reference {0}")]
    TransactionAlreadyExists(String),
    #[error("The requested wallet for {owner_id} in {currency} does not exist")]
    WalletNotFound { owner_id: String, currency: String },
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
