use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Client request for a collection fee quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeParams {
    pub method: String,
    pub currency: String,
    /// Decimal string, two decimal places at most.
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpParams {
    pub phone: String,
}

/// Client request to start a mobile-money collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoCollectionParams {
    pub user_id: String,
    pub phone: String,
    pub amount: String,
    pub service_fee: String,
    pub charges: String,
    pub country: String,
    pub currency: String,
    pub otp: String,
    pub customer: String,
    #[serde(default)]
    pub beneficiary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationParams {
    pub source_wallet: String,
    pub amount: String,
    #[serde(rename = "type")]
    pub payout_type: String,
    pub destination_country: String,
    pub destination_currency: String,
    pub amount_type: String,
}

/// Client request to execute a payout. `token` is the quotation token obtained from the quotation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutParams {
    pub user_id: String,
    pub token: String,
    pub country: String,
    pub currency: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
    /// Total to debit from the wallet, service fee included.
    pub total_amount: String,
    pub service_fee: String,
    #[serde(default)]
    pub beneficiary: Option<String>,
}
