use std::fmt::Debug;

use log::*;
use spg_common::Money;

use crate::{
    db_types::{Commission, Earning, NewAuditEntry, Transaction, TransactionType, Wallet, WalletKey},
    eversend_types::PaymentEvent,
    helpers::WalletLocks,
    spe_api::audit_api::AuditApi,
    traits::{ApplyResult, LedgerError, PaymentLedgerDatabase},
};

/// The default platform commission, in basis points of the transaction amount.
pub const DEFAULT_COMMISSION_RATE_BPS: i64 = 50;

/// Where an event came from, for the audit trail. Webhooks are [`EventOrigin::system`]; client-initiated operations
/// carry the acting principal.
#[derive(Debug, Clone)]
pub struct EventOrigin {
    pub actor: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl EventOrigin {
    pub fn system() -> Self {
        Self { actor: "system".to_string(), ip_address: None, user_agent: None }
    }

    pub fn client<S: Into<String>>(actor: S) -> Self {
        Self { actor: actor.into(), ip_address: None, user_agent: None }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// `LedgerApi` is the primary API for applying payment events to the ledger.
///
/// It owns the per-wallet serialization: every apply for the same (owner, currency) pair is linearized behind a
/// keyed lock, while applies for different wallets proceed fully in parallel. The storage backend provides
/// atomicity within one apply; the idempotency key (`external_reference`) makes redelivery safe regardless of
/// ordering. Every apply outcome is recorded in the audit log.
///
/// Clones share the lock registry, so any number of handles may serve requests concurrently.
#[derive(Clone)]
pub struct LedgerApi<B> {
    db: B,
    audit: AuditApi<B>,
    locks: WalletLocks,
    commission_rate_bps: i64,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B: Clone> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self {
            audit: AuditApi::new(db.clone()),
            db,
            locks: WalletLocks::new(),
            commission_rate_bps: DEFAULT_COMMISSION_RATE_BPS,
        }
    }

    pub fn with_commission_rate(mut self, rate_bps: i64) -> Self {
        self.commission_rate_bps = rate_bps;
        self
    }
}

impl<B> LedgerApi<B>
where B: PaymentLedgerDatabase
{
    /// Apply a validated payment event exactly once.
    ///
    /// Acquires the serialization lock for every wallet the event touches (both wallets, in sorted order, for a
    /// transfer), delegates the atomic work to the backend, then records the outcome in the audit log. Redelivered
    /// events resolve to [`ApplyResult::Duplicate`] without touching any balance.
    pub async fn apply(&self, event: &PaymentEvent, origin: &EventOrigin) -> Result<ApplyResult, LedgerError> {
        trace!("🔄️ Applying event [{}] for wallet {}/{}", event.external_reference, event.owner_id, event.currency);
        let mut keys = vec![WalletKey::new(&event.owner_id, &event.currency)];
        if event.transaction_type == TransactionType::Transfer {
            keys.push(WalletKey::new(&event.account_number, &event.currency));
        }
        let locks = self.locks.locks_for(&mut keys);
        let mut guards = Vec::with_capacity(locks.len());
        for lock in &locks {
            guards.push(lock.lock().await);
        }
        let result = self.db.apply_event(event, self.commission_rate_bps).await;
        drop(guards);
        match &result {
            Ok(outcome) => {
                self.audit.record(audit_entry_for(event, outcome, origin)).await;
            },
            Err(e) => {
                error!("🔄️ Event [{}] could not be applied. {e}", event.external_reference);
                let entry = NewAuditEntry::new(
                    origin.actor.clone(),
                    format!("Payment event {} failed to apply: {e}", event.external_reference),
                )
                .with_origin(origin.ip_address.clone(), origin.user_agent.clone());
                self.audit.record(entry).await;
            },
        }
        result
    }

    /// The current balance for the given wallet, or zero if the wallet has never been referenced.
    pub async fn balance(&self, owner_id: &str, currency: &str) -> Result<Money, LedgerError> {
        let wallet = self.db.fetch_wallet(owner_id, currency).await?;
        Ok(wallet.map(|w| w.balance).unwrap_or_default())
    }

    pub async fn wallet(&self, owner_id: &str, currency: &str) -> Result<Option<Wallet>, LedgerError> {
        self.db.fetch_wallet(owner_id, currency).await
    }

    pub async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>, LedgerError> {
        self.db.fetch_transaction_by_reference(reference).await
    }

    pub async fn commission_for_transaction(&self, transaction_id: i64) -> Result<Option<Commission>, LedgerError> {
        self.db.fetch_commission_for_transaction(transaction_id).await
    }

    pub async fn earnings_for_transaction(&self, transaction_id: i64) -> Result<Vec<Earning>, LedgerError> {
        self.db.fetch_earnings_for_transaction(transaction_id).await
    }

    pub fn audit(&self) -> &AuditApi<B> {
        &self.audit
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

fn audit_entry_for(event: &PaymentEvent, outcome: &ApplyResult, origin: &EventOrigin) -> NewAuditEntry {
    let action = match outcome {
        ApplyResult::Applied { transaction, new_balance } => format!(
            "Payment event {} applied: {} of {} {} is now {}. Balance: {new_balance}",
            event.external_reference, transaction.transaction_type, transaction.amount, transaction.currency,
            transaction.status
        ),
        ApplyResult::Duplicate { reference } => {
            format!("Payment event {reference} ignored as a duplicate delivery")
        },
        ApplyResult::Rejected { transaction, reason } => format!(
            "Payment event {} rejected: {reason}. {} of {} {} recorded as {}",
            event.external_reference, transaction.transaction_type, transaction.amount, transaction.currency,
            transaction.status
        ),
    };
    let snapshot = serde_json::to_value(event).unwrap_or_default();
    NewAuditEntry::new(origin.actor.clone(), action)
        .with_origin(origin.ip_address.clone(), origin.user_agent.clone())
        .with_snapshot(&snapshot)
}
