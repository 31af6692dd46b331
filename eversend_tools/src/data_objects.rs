use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spg_common::Secret;

/// A freshly issued bearer credential, with the provider-declared lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Secret<String>,
    pub expires_in: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFeeRequest {
    pub method: String,
    pub currency: String,
    /// Decimal string, e.g. "1050.75". Amounts are strings on the wire so no precision is lost in transit.
    pub amount: String,
}

/// The provider's fee quotation. Pass-through numeric fields are kept as raw JSON values; the ledger never computes
/// with them directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub charges: Option<Value>,
    #[serde(default)]
    pub service_fee: Option<Value>,
    #[serde(default)]
    pub total_to_pay: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpReceipt {
    #[serde(default)]
    pub pin_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoCollectionRequest {
    pub phone: String,
    pub amount: String,
    pub country: String,
    pub currency: String,
    pub transaction_ref: String,
    pub otp: String,
    pub customer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutQuotationRequest {
    pub source_wallet: String,
    pub amount: String,
    #[serde(rename = "type")]
    pub payout_type: String,
    pub destination_country: String,
    pub destination_currency: String,
    pub amount_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutQuote {
    /// Quotation token. Required by the subsequent payout execution call.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub quotation: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub token: String,
    pub country: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    pub transaction_ref: String,
}

/// The provider's view of a transaction, as returned by collection and payout calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTransaction {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub fees: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub destination_country: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
