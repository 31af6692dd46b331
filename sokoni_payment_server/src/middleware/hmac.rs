//! HMAC middleware for Actix Web.
//!
//! This module provides a middleware that checks the HMAC signature of incoming webhook requests.
//!
//! The provider signs each delivery with the shared webhook secret, using the raw body of the request as the data
//! to sign, and sends the base64-encoded result in a signature header. Verification must run on the exact bytes
//! received, before any parsing, because re-serialization can alter the signed representation. After a successful
//! check the consumed body is re-injected so downstream extractors see it untouched.
//!
//! Failed verifications are answered with 401 and recorded in the audit log under the "system" actor.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use spg_common::Secret;
use sokoni_payment_engine::{db_types::NewAuditEntry, AuditApi, PaymentLedgerDatabase};

use crate::helpers::verify_webhook_signature;

pub struct HmacMiddlewareFactory<B>
where B: PaymentLedgerDatabase
{
    hmac_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
    audit: AuditApi<B>,
}

impl<B> HmacMiddlewareFactory<B>
where B: PaymentLedgerDatabase
{
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool, audit: AuditApi<B>) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), key, enabled, audit }
    }
}

impl<S, B, D> Transform<S, ServiceRequest> for HmacMiddlewareFactory<D>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    D: PaymentLedgerDatabase + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S, D>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            audit: self.audit.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S, D>
where D: PaymentLedgerDatabase
{
    hmac_header: String,
    key: Secret<String>,
    enabled: bool,
    audit: AuditApi<D>,
    service: Rc<S>,
}

impl<S, B, D> Service<ServiceRequest> for HmacMiddlewareService<S, D>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    D: PaymentLedgerDatabase + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let hmac_header = self.hmac_header.clone();
        let enabled = self.enabled;
        let audit = self.audit.clone();
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Webhook signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req.headers().get(&hmac_header).and_then(|v| v.to_str().ok());
            let validated = match signature {
                Some(sig) => verify_webhook_signature(&secret, data.as_ref(), sig),
                None => {
                    warn!("🔐️ No webhook signature found in request.");
                    false
                },
            };
            if validated {
                trace!("🔐️ Webhook signature check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid webhook signature. Denying access.");
                let ip = req.connection_info().peer_addr().map(|a| a.to_string());
                let user_agent =
                    req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
                let entry =
                    NewAuditEntry::system("Webhook signature verification failed").with_origin(ip, user_agent);
                actix_web::rt::spawn(async move { audit.record(entry).await });
                Err(ErrorUnauthorized("Invalid signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
