use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spg_common::Money;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------       Wallet        ---------------------------------------------------------
/// A wallet holds the balance for one (owner, currency) pair. Wallets are created on first reference and never
/// deleted; the balance only ever changes inside the ledger's serialized apply path.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub owner_id: String,
    pub currency: String,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The composite key identifying a wallet. Used for lock acquisition, so the rendering must be stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletKey {
    pub owner_id: String,
    pub currency: String,
}

impl WalletKey {
    pub fn new<S: Into<String>, C: Into<String>>(owner_id: S, currency: C) -> Self {
        Self { owner_id: owner_id.into(), currency: currency.into() }
    }
}

impl Display for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.currency)
    }
}

//--------------------------------------  TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "Deposit"),
            TransactionType::Withdraw => write!(f, "Withdraw"),
            TransactionType::Transfer => write!(f, "Transfer"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deposit" => Ok(Self::Deposit),
            "Withdraw" => Ok(Self::Withdraw),
            "Transfer" => Ok(Self::Transfer),
            s => Err(ConversionError(format!("Invalid transaction type: {s}"))),
        }
    }
}

//-------------------------------------- TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The transaction has been recorded, but the provider has not settled it yet.
    Pending,
    /// The provider confirmed the transaction. Balance effects and commission/earning rows exist.
    Completed,
    /// The transaction will never settle. No balance effects remain.
    Failed,
    /// A previously completed transaction that was undone by an explicit reversal event.
    Reversed,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Failed => write!(f, "Failed"),
            TransactionStatus::Reversed => write!(f, "Reversed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Reversed" => Ok(Self::Reversed),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            TransactionStatus::Pending
        })
    }
}

//--------------------------------------     Transaction     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: i64,
    /// The provider-supplied reference. Globally unique; this is the idempotency key.
    pub external_reference: String,
    /// The provider's own transaction id, once known.
    pub provider_id: Option<String>,
    pub wallet_id: i64,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: String,
    pub country: String,
    pub charges: Money,
    pub account_number: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub external_reference: String,
    pub provider_id: Option<String>,
    pub wallet_id: i64,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: String,
    pub country: String,
    pub charges: Money,
    pub account_number: String,
    pub status: TransactionStatus,
}

//--------------------------------------     Commission      ---------------------------------------------------------
/// The platform's cut of a completed transaction. At most one per transaction, immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Commission {
    pub id: i64,
    pub transaction_id: i64,
    pub amount: Money,
    /// The rate that was in force when the commission was computed, in basis points.
    pub rate_bps: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   EarningStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum EarningStatus {
    Pending,
    Paid,
}

impl Display for EarningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarningStatus::Pending => write!(f, "Pending"),
            EarningStatus::Paid => write!(f, "Paid"),
        }
    }
}

impl FromStr for EarningStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            s => Err(ConversionError(format!("Invalid earning status: {s}"))),
        }
    }
}

//--------------------------------------       Earning       ---------------------------------------------------------
/// A beneficiary's share of a completed transaction. Only the status field ever changes, when a payout to the
/// beneficiary clears.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Earning {
    pub id: i64,
    pub transaction_id: i64,
    pub beneficiary: String,
    pub amount: Money,
    pub status: EarningStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     AuditEntry      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub ip_address: String,
    pub user_agent: String,
    pub action: String,
    pub payload_snapshot: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Keys whose values never make it into an audit snapshot.
const REDACTED_KEYS: [&str; 6] = ["otp", "token", "clientId", "clientSecret", "password", "secret"];

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub ip_address: String,
    pub user_agent: String,
    pub action: String,
    pub payload_snapshot: Option<String>,
}

impl NewAuditEntry {
    pub fn new<A: Into<String>, S: Into<String>>(actor: A, action: S) -> Self {
        Self {
            actor: actor.into(),
            ip_address: "Unknown".to_string(),
            user_agent: "Unknown".to_string(),
            action: action.into(),
            payload_snapshot: None,
        }
    }

    /// Webhooks and other provider-initiated events have no human principal behind them.
    pub fn system<S: Into<String>>(action: S) -> Self {
        Self::new("system", action)
    }

    pub fn with_origin(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        if let Some(ip) = ip_address {
            self.ip_address = ip;
        }
        if let Some(ua) = user_agent {
            self.user_agent = ua;
        }
        self
    }

    /// Attach a JSON snapshot of the triggering payload. Secret-bearing keys are masked before the snapshot is
    /// stored, at any nesting depth.
    pub fn with_snapshot(mut self, payload: &Value) -> Self {
        let mut snapshot = payload.clone();
        redact_in_place(&mut snapshot);
        self.payload_snapshot = Some(snapshot.to_string());
        self
    }
}

fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if REDACTED_KEYS.contains(&key.as_str()) {
                    *val = Value::String("****".to_string());
                } else {
                    redact_in_place(val);
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {},
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshots_mask_secret_keys() {
        let payload = json!({
            "amount": "100.00",
            "otp": "123456",
            "customer": { "token": "abc", "phone": "256700000000" }
        });
        let entry = NewAuditEntry::system("test").with_snapshot(&payload);
        let snap = entry.payload_snapshot.unwrap();
        assert!(!snap.contains("123456"));
        assert!(!snap.contains("abc"));
        assert!(snap.contains("256700000000"));
        assert!(snap.contains("100.00"));
    }
}
