use std::time::Duration;

use actix_web::{body::to_bytes, http::StatusCode, test, web, App, HttpResponse};
use serde_json::{json, Value};
use spg_common::{Money, Secret};
use sokoni_payment_engine::{
    db_types::TransactionStatus,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    LedgerApi,
    SqliteDatabase,
};

use crate::{
    config::ProxyOptions,
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    webhook_routes::EversendWebhookRoute,
};

const SECRET: &str = "test-webhook-secret";
const SIG_HEADER: &str = "x-eversend-signature";

async fn new_ledger() -> LedgerApi<SqliteDatabase> {
    let _ = env_logger::try_init();
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database");
    LedgerApi::new(db)
}

fn deposit_body(reference: &str, amount: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "eventType": "wallet.load",
        "transactionRef": reference,
        "transactionId": "ev-1",
        "amount": amount,
        "currency": "UGX",
        "country": "UG",
        "status": "successful",
        "userId": "user-1"
    }))
    .expect("serializing test payload")
}

async fn post_webhook(
    ledger: &LedgerApi<SqliteDatabase>,
    body: &[u8],
    signature: Option<&str>,
) -> (StatusCode, String) {
    let app = App::new()
        .app_data(web::Data::new(ledger.clone()))
        .app_data(web::Data::new(ProxyOptions::default()))
        .service(
            web::scope("/webhook")
                .wrap(HmacMiddlewareFactory::new(
                    SIG_HEADER,
                    Secret::new(SECRET.to_string()),
                    true,
                    ledger.audit().clone(),
                ))
                .service(EversendWebhookRoute::<SqliteDatabase>::new()),
        );
    let service = test::init_service(app).await;
    let mut req = test::TestRequest::post()
        .uri("/webhook/payments")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_vec());
    if let Some(sig) = signature {
        req = req.insert_header((SIG_HEADER, sig));
    }
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = HttpResponse::from_error(e);
            let status = res.status();
            let body = to_bytes(res.into_body()).await.unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

#[actix_web::test]
async fn missing_signature_is_unauthorized() {
    let ledger = new_ledger().await;
    let body = deposit_body("tx-no-sig", "100.00");
    let (status, _) = post_webhook(&ledger, &body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(ledger.transaction_by_reference("tx-no-sig").await.unwrap().is_none());
}

#[actix_web::test]
async fn invalid_signature_is_unauthorized_and_audited() {
    let ledger = new_ledger().await;
    let body = deposit_body("tx-bad-sig", "100.00");
    let (status, _) = post_webhook(&ledger, &body, Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(ledger.transaction_by_reference("tx-bad-sig").await.unwrap().is_none());

    // The audit write is fire-and-forget; give it a moment to land.
    let mut audited = false;
    for _ in 0..20 {
        let entries = ledger.audit().entries_for_actor("system").await.unwrap();
        if entries.iter().any(|e| e.action.contains("signature")) {
            audited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(audited, "signature failure was not audited");
}

#[actix_web::test]
async fn tampered_body_fails_verification() {
    let ledger = new_ledger().await;
    let body = deposit_body("tx-tamper", "100.00");
    let signature = calculate_hmac(SECRET, &body);
    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 0x01;
    let (status, _) = post_webhook(&ledger, &tampered, Some(&signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn malformed_json_with_valid_signature_is_bad_request() {
    let ledger = new_ledger().await;
    let body = b"this is not json".to_vec();
    let signature = calculate_hmac(SECRET, &body);
    let (status, _) = post_webhook(&ledger, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn payload_failing_validation_is_bad_request() {
    let ledger = new_ledger().await;
    let body = serde_json::to_vec(&json!({
        "eventType": "wallet.load",
        "amount": "100.00",
        "currency": "UGX",
        "country": "UG",
        "status": "successful",
        "userId": "user-1"
    }))
    .unwrap();
    let signature = calculate_hmac(SECRET, &body);
    let (status, body) = post_webhook(&ledger, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("transactionRef"));
}

#[actix_web::test]
async fn valid_deposit_is_applied_and_redelivery_is_acknowledged() {
    let ledger = new_ledger().await;
    let body = deposit_body("tx-100", "10000");
    let signature = calculate_hmac(SECRET, &body);

    let (status, response) = post_webhook(&ledger, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(response["success"], json!(true));
    assert_eq!(ledger.balance("user-1", "UGX").await.unwrap(), Money::from_major(10_000));
    let tx = ledger.transaction_by_reference("tx-100").await.unwrap().expect("transaction missing");
    assert_eq!(tx.status, TransactionStatus::Completed);

    // Redelivery of the identical payload: 200, no second application.
    let (status, response) = post_webhook(&ledger, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains("already"));
    assert_eq!(ledger.balance("user-1", "UGX").await.unwrap(), Money::from_major(10_000));
}

#[actix_web::test]
async fn overdrawing_payout_event_is_unprocessable() {
    let ledger = new_ledger().await;
    let funding = deposit_body("tx-fund", "100.00");
    let signature = calculate_hmac(SECRET, &funding);
    let (status, _) = post_webhook(&ledger, &funding, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);

    let body = serde_json::to_vec(&json!({
        "eventType": "transaction.payout",
        "transactionRef": "tx-overdraw",
        "amount": "95.00",
        "charges": "10.00",
        "currency": "UGX",
        "country": "UG",
        "status": "pending",
        "accountNumber": "256700123456",
        "userId": "user-1"
    }))
    .unwrap();
    let signature = calculate_hmac(SECRET, &body);
    let (status, _) = post_webhook(&ledger, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ledger.balance("user-1", "UGX").await.unwrap(), Money::from_major(100));
    let tx = ledger.transaction_by_reference("tx-overdraw").await.unwrap().expect("transaction missing");
    assert_eq!(tx.status, TransactionStatus::Failed);
}
