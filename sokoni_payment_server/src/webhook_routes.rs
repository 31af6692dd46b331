//----------------------------------------------   Webhook  ----------------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info, trace, warn};
use sokoni_payment_engine::{
    eversend_types::PaymentEventPayload,
    ApplyResult,
    EventOrigin,
    LedgerApi,
    PaymentLedgerDatabase,
};

use crate::{config::ProxyOptions, data_objects::JsonResponse, errors::ServerError, helpers::get_remote_ip, route};

route!(eversend_webhook => Post "/payments" impl PaymentLedgerDatabase);
/// The provider's asynchronous payment notification endpoint.
///
/// Authenticity is established by the HMAC middleware wrapping this route, on the raw request bytes. By the time
/// this handler runs the body is trusted; it still has to survive validation before it may touch the ledger.
///
/// Response contract: 400 for payloads that fail validation, 422 for business-rule rejections, 200 for everything
/// that was applied, duplicates included, since redelivery of an applied event is expected provider behaviour.
/// Storage failures bubble up as 500 so the provider redelivers; idempotency makes that safe.
pub async fn eversend_webhook<B>(
    req: HttpRequest,
    body: web::Json<PaymentEventPayload>,
    api: web::Data<LedgerApi<B>>,
    options: web::Data<ProxyOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentLedgerDatabase,
{
    trace!("📡️ Received webhook request: {}", req.uri());
    let payload = body.into_inner();
    let event = payload.validate().map_err(|e| {
        warn!("📡️ Webhook payload failed validation. {e}");
        ServerError::from(e)
    })?;
    let ip = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded).map(|ip| ip.to_string());
    let user_agent = req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
    let origin = EventOrigin::system().with_ip(ip).with_user_agent(user_agent);
    match api.apply(&event, &origin).await {
        Ok(ApplyResult::Applied { transaction, new_balance }) => {
            info!(
                "📡️ Event [{}] applied: {} now {}. Balance: {new_balance}",
                transaction.external_reference, transaction.transaction_type, transaction.status
            );
            Ok(HttpResponse::Ok().json(JsonResponse::success("Webhook processed successfully.")))
        },
        Ok(ApplyResult::Duplicate { reference }) => {
            info!("📡️ Event [{reference}] was already applied. Acknowledging redelivery.");
            Ok(HttpResponse::Ok().json(JsonResponse::success("Event already processed.")))
        },
        Ok(ApplyResult::Rejected { transaction, reason }) => {
            warn!("📡️ Event [{}] rejected: {reason}", transaction.external_reference);
            Ok(HttpResponse::UnprocessableEntity().json(JsonResponse::failure(reason)))
        },
        Err(e) => {
            debug!("📡️ Event [{}] could not be applied. {e}", event.external_reference);
            Err(ServerError::from(e))
        },
    }
}
