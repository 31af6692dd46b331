//----------------------------------------------   Collections & Payouts  ---------------------------------------------
//! Client-initiated provider operations. Every flow calls the provider first; only once the provider has accepted
//! the operation does a transaction land in the ledger, so a failed outbound call never leaves half-applied state.

use actix_web::{post, web, HttpRequest, HttpResponse};
use eversend_tools::{
    CollectionFeeRequest,
    EversendApi,
    MomoCollectionRequest,
    PayoutQuotationRequest,
    PayoutRequest,
};
use log::{info, warn};
use rand::Rng;
use serde_json::{json, Value};
use spg_common::Money;
use sokoni_payment_engine::{
    db_types::{TransactionStatus, TransactionType},
    eversend_types::PaymentEvent,
    ApplyResult,
    EventOrigin,
    LedgerApi,
    PaymentLedgerDatabase,
};

use crate::{
    config::{CommissionOptions, ProxyOptions},
    data_objects::{FeeParams, MomoCollectionParams, OtpParams, PayoutParams, QuotationParams},
    errors::ServerError,
    helpers::get_remote_ip,
    route,
};

#[post("/fees")]
pub async fn collection_fees(
    body: web::Json<FeeParams>,
    api: web::Data<EversendApi>,
    commission: web::Data<CommissionOptions>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let amount = parse_amount(&params.amount)?;
    let request = CollectionFeeRequest {
        method: params.method.trim().to_string(),
        currency: params.currency.trim().to_uppercase(),
        amount: amount.to_string(),
    };
    let mut quote = api.collection_fees(&request).await?;
    // The platform's service fee goes on top of whatever the provider charges.
    let service_fee = Money::from_cents(amount.value() * commission.rate_bps / 10_000);
    let provider_charges = quote.charges.as_ref().and_then(value_to_money).unwrap_or_default();
    let charges = provider_charges + service_fee;
    quote.service_fee = Some(json!(service_fee.to_string()));
    quote.charges = Some(json!(charges.to_string()));
    quote.total_to_pay = Some(json!((amount + charges).to_string()));
    info!("💸️ Fee quote for {} {}: {charges} in charges", amount, request.currency);
    Ok(HttpResponse::Ok().json(quote))
}

#[post("/otp")]
pub async fn collection_otp(
    body: web::Json<OtpParams>,
    api: web::Data<EversendApi>,
) -> Result<HttpResponse, ServerError> {
    let phone = clean_phone(&body.phone)?;
    let receipt = api.request_otp(&phone).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

route!(collection_momo => Post "/momo" impl PaymentLedgerDatabase);
/// Start a mobile-money collection: the provider pulls `amount` from the customer's phone, and a pending deposit
/// lands in the ledger under a fresh reference. The deposit settles when the provider's webhook arrives.
pub async fn collection_momo<B>(
    req: HttpRequest,
    body: web::Json<MomoCollectionParams>,
    provider: web::Data<EversendApi>,
    ledger: web::Data<LedgerApi<B>>,
    options: web::Data<ProxyOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentLedgerDatabase,
{
    let params = body.into_inner();
    let phone = clean_phone(&params.phone)?;
    let amount = parse_amount(&params.amount)?;
    let service_fee = parse_charge(&params.service_fee)?;
    let provider_charges = parse_charge(&params.charges)?;
    let reference = new_transaction_ref();
    let request = MomoCollectionRequest {
        phone: phone.clone(),
        amount: amount.to_string(),
        country: params.country.trim().to_uppercase(),
        currency: params.currency.trim().to_uppercase(),
        transaction_ref: reference.clone(),
        otp: params.otp.trim().to_string(),
        customer: params.customer.trim().to_string(),
    };
    let provider_tx = provider.initiate_momo_collection(&request).await?;

    let event = PaymentEvent {
        external_reference: reference.clone(),
        provider_id: provider_tx.transaction_id.clone(),
        owner_id: params.user_id.clone(),
        transaction_type: TransactionType::Deposit,
        amount,
        currency: request.currency.clone(),
        country: request.country.clone(),
        charges: service_fee + provider_charges,
        account_number: phone,
        status: TransactionStatus::Pending,
        beneficiary: params.beneficiary.clone(),
    };
    let origin = client_origin(&req, &params.user_id, &options);
    match ledger.apply(&event, &origin).await? {
        ApplyResult::Rejected { reason, .. } => {
            warn!("💸️ Collection [{reference}] was rejected by the ledger: {reason}");
            Err(ServerError::InsufficientBalance(reason.to_string()))
        },
        _ => {
            info!("💸️ MoMo collection [{reference}] initiated for {}", params.user_id);
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "transactionRef": reference,
                "transaction": provider_tx,
            })))
        },
    }
}

#[post("/quotation")]
pub async fn payout_quotation(
    body: web::Json<QuotationParams>,
    api: web::Data<EversendApi>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let amount = parse_amount(&params.amount)?;
    let source_wallet = params.source_wallet.trim().to_uppercase();
    let destination_currency = params.destination_currency.trim().to_uppercase();
    if source_wallet.len() != 3 || destination_currency.len() != 3 {
        return Err(ServerError::InvalidRequestBody("Currencies must be 3-letter codes".to_string()));
    }
    let request = PayoutQuotationRequest {
        source_wallet,
        amount: amount.to_string(),
        payout_type: params.payout_type.trim().to_lowercase(),
        destination_country: params.destination_country.trim().to_uppercase(),
        destination_currency,
        amount_type: params.amount_type.trim().to_lowercase(),
    };
    let quote = api.payout_quotation(&request).await?;
    Ok(HttpResponse::Ok().json(quote))
}

route!(payout => Post "" impl PaymentLedgerDatabase);
/// Execute a payout. The quotation token authorizes the amount with the provider; on acceptance a withdrawal is
/// recorded against the wallet, which reserves `totalAmount` until the provider's settlement webhook arrives.
pub async fn payout<B>(
    req: HttpRequest,
    body: web::Json<PayoutParams>,
    provider: web::Data<EversendApi>,
    ledger: web::Data<LedgerApi<B>>,
    options: web::Data<ProxyOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentLedgerDatabase,
{
    let params = body.into_inner();
    let phone = clean_phone(&params.phone_number)?;
    let total = parse_amount(&params.total_amount)?;
    let service_fee = parse_charge(&params.service_fee)?;
    if total <= service_fee {
        return Err(ServerError::InvalidRequestBody("totalAmount must exceed the service fee".to_string()));
    }
    let first_name = params.first_name.trim();
    let last_name = params.last_name.trim();
    if first_name.len() < 2 || last_name.len() < 2 {
        return Err(ServerError::InvalidRequestBody(
            "firstName and lastName must be at least 2 characters".to_string(),
        ));
    }
    let currency = params.currency.trim().to_uppercase();

    // Cheap pre-check; the authoritative funds check happens inside the serialized ledger apply.
    let balance = ledger.balance(&params.user_id, &currency).await?;
    if balance < total {
        warn!("💸️ Payout for {} needs {total} but the wallet holds {balance}", params.user_id);
        return Err(ServerError::InsufficientBalance(format!("Wallet holds {balance}, payout needs {total}")));
    }

    let reference = new_transaction_ref();
    let request = PayoutRequest {
        token: params.token.trim().to_string(),
        country: params.country.trim().to_uppercase(),
        phone_number: phone.clone(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        transaction_ref: reference.clone(),
    };
    let provider_tx = provider.payout(&request).await?;

    let event = PaymentEvent {
        external_reference: reference.clone(),
        provider_id: provider_tx.transaction_id.clone(),
        owner_id: params.user_id.clone(),
        transaction_type: TransactionType::Withdraw,
        amount: total - service_fee,
        currency,
        country: provider_tx.destination_country.clone().unwrap_or(request.country.clone()),
        charges: service_fee,
        account_number: phone,
        status: TransactionStatus::Pending,
        beneficiary: params.beneficiary.clone(),
    };
    let origin = client_origin(&req, &params.user_id, &options);
    match ledger.apply(&event, &origin).await? {
        ApplyResult::Rejected { reason, .. } => {
            warn!("💸️ Payout [{reference}] was rejected by the ledger: {reason}");
            Err(ServerError::InsufficientBalance(reason.to_string()))
        },
        _ => {
            info!("💸️ Payout [{reference}] initiated for {}", params.user_id);
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "transactionRef": reference,
                "transaction": provider_tx,
            })))
        },
    }
}

//----------------------------------------------   Helpers  ----------------------------------------------------

fn parse_amount(value: &str) -> Result<Money, ServerError> {
    let amount = value.parse::<Money>().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    if !amount.is_positive() {
        return Err(ServerError::InvalidRequestBody(format!("Amount must be greater than 0, got {amount}")));
    }
    Ok(amount)
}

fn parse_charge(value: &str) -> Result<Money, ServerError> {
    if value.trim().is_empty() {
        return Ok(Money::default());
    }
    value.parse::<Money>().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))
}

fn clean_phone(phone: &str) -> Result<String, ServerError> {
    let cleaned: String = phone.trim().chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if digits.len() < 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServerError::InvalidRequestBody("Invalid phone number format".to_string()));
    }
    Ok(cleaned)
}

fn new_transaction_ref() -> String {
    let tag: u64 = rand::thread_rng().gen::<u64>() & 0xffff_ffff_ffff;
    format!("txn_{tag:012x}")
}

fn client_origin(req: &HttpRequest, user_id: &str, options: &ProxyOptions) -> EventOrigin {
    let actor = req
        .headers()
        .get("X-Actor-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| user_id.to_string());
    let ip = get_remote_ip(req, options.use_x_forwarded_for, options.use_forwarded).map(|ip| ip.to_string());
    let user_agent = req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
    EventOrigin::client(actor).with_ip(ip).with_user_agent(user_agent)
}

fn value_to_money(value: &Value) -> Option<Money> {
    match value {
        Value::String(s) => s.parse::<Money>().ok(),
        Value::Number(n) => n.to_string().parse::<Money>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transaction_refs_have_the_expected_shape() {
        let reference = new_transaction_ref();
        assert!(reference.starts_with("txn_"));
        assert_eq!(reference.len(), 16);
        assert!(reference[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn phone_cleaning_strips_separators() {
        assert_eq!(clean_phone(" +256 700-123-456 ").unwrap(), "+256700123456");
        assert!(clean_phone("12345").is_err());
        assert!(clean_phone("notaphone123").is_err());
    }

    #[test]
    fn charges_may_be_empty_but_not_junk() {
        assert_eq!(parse_charge("").unwrap(), Money::default());
        assert_eq!(parse_charge("12.50").unwrap(), Money::from_cents(1250));
        assert!(parse_charge("n/a").is_err());
    }
}
