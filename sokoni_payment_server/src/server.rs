use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use eversend_tools::EversendApi;
use log::info;
use sokoni_payment_engine::{AuditApi, LedgerApi, SqliteDatabase};

use crate::{
    config::{CommissionOptions, ProxyOptions, ServerConfig},
    errors::ServerError,
    middleware::HmacMiddlewareFactory,
    payment_routes::{collection_fees, collection_otp, payout_quotation, CollectionMomoRoute, PayoutRoute},
    routes::health,
    webhook_routes::EversendWebhookRoute,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let eversend = EversendApi::new(config.eversend.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db, eversend)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    eversend: EversendApi,
) -> Result<Server, ServerError> {
    // One ledger API for the whole process: its per-wallet locks must be shared by every worker.
    let ledger = LedgerApi::new(db.clone()).with_commission_rate(config.commission_rate_bps);
    info!("🚀️ Ledger initialised against {}", config.database_url);
    let proxy = ProxyOptions::from_config(&config);
    let commission = CommissionOptions::from_config(&config);
    let webhook = config.webhook.clone();
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sps::access_log"))
            .app_data(web::Data::new(ledger.clone()))
            .app_data(web::Data::new(eversend.clone()))
            .app_data(web::Data::new(proxy))
            .app_data(web::Data::new(commission));
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                &webhook.hmac_header,
                webhook.hmac_secret.clone(),
                webhook.hmac_checks,
                AuditApi::new(db.clone()),
            ))
            .service(EversendWebhookRoute::<SqliteDatabase>::new());
        let collections_scope = web::scope("/collections")
            .service(collection_fees)
            .service(collection_otp)
            .service(CollectionMomoRoute::<SqliteDatabase>::new());
        let payouts_scope =
            web::scope("/payouts").service(payout_quotation).service(PayoutRoute::<SqliteDatabase>::new());
        app.service(health).service(webhook_scope).service(collections_scope).service(payouts_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
