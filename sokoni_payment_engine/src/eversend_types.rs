//! Wire types for the provider's webhook notifications.
//!
//! Webhook bodies arrive loosely typed: optional fields, amounts as either JSON numbers or strings, and the
//! provider's own vocabulary for event types and statuses. [`PaymentEventPayload`] captures that shape verbatim;
//! [`PaymentEventPayload::validate`] is the only way to obtain a [`PaymentEvent`], so everything past the boundary
//! works with strongly typed data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spg_common::Money;
use thiserror::Error;

use crate::db_types::{TransactionStatus, TransactionType};

/// Currencies the ledger accepts. Everything else is rejected at validation.
pub const SUPPORTED_CURRENCIES: [&str; 7] = ["UGX", "KES", "TZS", "RWF", "GHS", "NGN", "USD"];

/// Countries the provider can collect from or pay out to.
pub const SUPPORTED_COUNTRIES: [&str; 7] = ["UG", "KE", "TZ", "RW", "GH", "NG", "US"];

pub const EVENT_WALLET_LOAD: &str = "wallet.load";
pub const EVENT_TRANSACTION_PAYOUT: &str = "transaction.payout";
pub const EVENT_WALLET_TRANSFER: &str = "wallet.transfer";

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0} is not a supported event type")]
    UnsupportedEventType(String),
    #[error("{0} is not a supported currency")]
    UnsupportedCurrency(String),
    #[error("{0} is not a supported country")]
    UnsupportedCountry(String),
    #[error("{0} is not a supported status")]
    UnsupportedStatus(String),
}

/// The webhook body as the provider sends it. Every field is optional at this level; validation decides what is
/// actually required for the event type at hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEventPayload {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub charges: Option<Value>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub beneficiary: Option<String>,
}

/// A fully validated payment event, ready for the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEvent {
    pub external_reference: String,
    pub provider_id: Option<String>,
    pub owner_id: String,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub currency: String,
    pub country: String,
    pub charges: Money,
    pub account_number: String,
    pub status: TransactionStatus,
    pub beneficiary: Option<String>,
}

impl PaymentEventPayload {
    /// Validate the raw payload and produce a typed [`PaymentEvent`]. Pure: no storage access, no side effects.
    pub fn validate(&self) -> Result<PaymentEvent, ValidationError> {
        let event_type = self.event_type.as_deref().ok_or(ValidationError::MissingField("eventType"))?;
        let transaction_type = parse_event_type(event_type)?;
        let external_reference = non_empty(self.transaction_ref.as_deref(), "transactionRef")?;
        let owner_id = non_empty(self.user_id.as_deref(), "userId")?;
        let currency = non_empty(self.currency.as_deref(), "currency")?.to_uppercase();
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(ValidationError::UnsupportedCurrency(currency));
        }
        let country = non_empty(self.country.as_deref(), "country")?.to_uppercase();
        if !SUPPORTED_COUNTRIES.contains(&country.as_str()) {
            return Err(ValidationError::UnsupportedCountry(country));
        }
        let status = parse_status(self.status.as_deref().ok_or(ValidationError::MissingField("status"))?)?;
        let amount = parse_amount(self.amount.as_ref().ok_or(ValidationError::MissingField("amount"))?)?;
        if !amount.is_positive() {
            return Err(ValidationError::InvalidAmount(format!("{amount} is not positive")));
        }
        let charges = match &self.charges {
            Some(value) => parse_amount(value)?,
            None => Money::default(),
        };
        if charges.is_negative() {
            return Err(ValidationError::InvalidAmount(format!("charges of {charges} are negative")));
        }
        // Withdrawals and transfers need a destination; deposits land in the owner's wallet directly.
        let account_number = match (transaction_type, self.account_number.as_deref()) {
            (TransactionType::Deposit, acct) => acct.unwrap_or_default().to_string(),
            (_, acct) => non_empty(acct, "accountNumber")?.to_string(),
        };
        Ok(PaymentEvent {
            external_reference: external_reference.to_string(),
            provider_id: self.transaction_id.clone().filter(|s| !s.is_empty()),
            owner_id: owner_id.to_string(),
            transaction_type,
            amount,
            currency,
            country,
            charges,
            account_number,
            status,
            beneficiary: self.beneficiary.clone().filter(|s| !s.is_empty()),
        })
    }
}

fn non_empty<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.trim()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn parse_event_type(event_type: &str) -> Result<TransactionType, ValidationError> {
    match event_type.to_lowercase().as_str() {
        EVENT_WALLET_LOAD => Ok(TransactionType::Deposit),
        EVENT_TRANSACTION_PAYOUT => Ok(TransactionType::Withdraw),
        EVENT_WALLET_TRANSFER => Ok(TransactionType::Transfer),
        other => Err(ValidationError::UnsupportedEventType(other.to_string())),
    }
}

/// The provider reports settled transactions as "successful"; internally that is [`TransactionStatus::Completed`].
fn parse_status(status: &str) -> Result<TransactionStatus, ValidationError> {
    match status.to_lowercase().as_str() {
        "pending" => Ok(TransactionStatus::Pending),
        "successful" | "completed" => Ok(TransactionStatus::Completed),
        "failed" => Ok(TransactionStatus::Failed),
        "reversed" => Ok(TransactionStatus::Reversed),
        other => Err(ValidationError::UnsupportedStatus(other.to_string())),
    }
}

/// Amounts arrive as JSON numbers or decimal strings. Both paths go through [`Money`]'s string parser, so precision
/// beyond two decimal places is rejected rather than rounded.
fn parse_amount(value: &Value) -> Result<Money, ValidationError> {
    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(ValidationError::InvalidAmount(other.to_string())),
    };
    rendered.parse::<Money>().map_err(|e| ValidationError::InvalidAmount(e.to_string()))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn deposit_payload() -> PaymentEventPayload {
        serde_json::from_value(json!({
            "eventType": "wallet.load",
            "transactionRef": "tx-100",
            "transactionId": "ev-555",
            "amount": 10000,
            "currency": "UGX",
            "country": "UG",
            "status": "successful",
            "charges": "50.00",
            "userId": "user-1"
        }))
        .unwrap()
    }

    #[test]
    fn valid_deposit_passes() {
        let event = deposit_payload().validate().unwrap();
        assert_eq!(event.transaction_type, TransactionType::Deposit);
        assert_eq!(event.status, TransactionStatus::Completed);
        assert_eq!(event.amount, Money::from_major(10_000));
        assert_eq!(event.charges, Money::from_cents(5_000));
        assert_eq!(event.external_reference, "tx-100");
        assert_eq!(event.provider_id.as_deref(), Some("ev-555"));
    }

    #[test]
    fn missing_reference_is_rejected() {
        let mut payload = deposit_payload();
        payload.transaction_ref = None;
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("transactionRef")));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let mut payload = deposit_payload();
        payload.event_type = Some("card.charge".to_string());
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::UnsupportedEventType(_)));
    }

    #[test]
    fn unsupported_currency_is_rejected() {
        let mut payload = deposit_payload();
        payload.currency = Some("EUR".to_string());
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::UnsupportedCurrency(_)));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut payload = deposit_payload();
        payload.amount = Some(json!(0));
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::InvalidAmount(_)));
    }

    #[test]
    fn overly_precise_amount_is_rejected() {
        let mut payload = deposit_payload();
        payload.amount = Some(json!("10.123"));
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::InvalidAmount(_)));
    }

    #[test]
    fn payout_requires_account_number() {
        let mut payload = deposit_payload();
        payload.event_type = Some("transaction.payout".to_string());
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::MissingField("accountNumber")));
        payload.account_number = Some("256700000000".to_string());
        let event = payload.validate().unwrap();
        assert_eq!(event.transaction_type, TransactionType::Withdraw);
        assert_eq!(event.account_number, "256700000000");
    }

    #[test]
    fn status_vocabulary_is_normalized() {
        let mut payload = deposit_payload();
        payload.status = Some("SUCCESSFUL".to_string());
        assert_eq!(payload.validate().unwrap().status, TransactionStatus::Completed);
        payload.status = Some("reversed".to_string());
        assert_eq!(payload.validate().unwrap().status, TransactionStatus::Reversed);
        payload.status = Some("unknown".to_string());
        assert!(matches!(payload.validate().unwrap_err(), ValidationError::UnsupportedStatus(_)));
    }
}
