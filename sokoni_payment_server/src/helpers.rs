use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64-encoded HMAC-SHA256 of `data` under `secret`. This is the signature the provider attaches to
/// webhook deliveries, computed over the raw request body.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(data);
            base64::encode(mac.finalize().into_bytes())
        },
        Err(_) => String::new(),
    }
}

/// Verify a webhook signature against the raw, unmodified request bytes.
///
/// Returns false on a malformed signature encoding or a mismatch; it never panics and never parses the body. The
/// comparison runs in constant time via [`Mac::verify_slice`], so the signature cannot be probed byte by byte.
pub fn verify_webhook_signature(secret: &str, raw_body: &[u8], signature_header: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let Ok(signature) = base64::decode(signature_header.trim()) else {
        return false;
    };
    mac.verify_slice(&signature).is_ok()
}

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result =
            req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).unwrap();
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str())
            .and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "supersecret";

    #[test]
    fn correct_signature_verifies() {
        let body = br#"{"eventType":"wallet.load","transactionRef":"tx-1"}"#;
        let signature = calculate_hmac(SECRET, body);
        assert!(verify_webhook_signature(SECRET, body, &signature));
    }

    #[test]
    fn any_flipped_body_byte_fails_verification() {
        let body = b"payload-bytes-under-test".to_vec();
        let signature = calculate_hmac(SECRET, &body);
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_webhook_signature(SECRET, &tampered, &signature), "byte {i} flip went unnoticed");
        }
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let body = b"payload-bytes-under-test";
        let signature = calculate_hmac(SECRET, body);
        let decoded = base64::decode(&signature).unwrap();
        for i in 0..decoded.len() {
            let mut tampered = decoded.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_webhook_signature(SECRET, body, &base64::encode(&tampered)));
        }
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = b"payload-bytes-under-test";
        let signature = calculate_hmac(SECRET, body);
        assert!(!verify_webhook_signature("othersecret", body, &signature));
    }

    #[test]
    fn malformed_signature_encoding_is_rejected_not_panicked() {
        let body = b"payload-bytes-under-test";
        assert!(!verify_webhook_signature(SECRET, body, "%%% not base64 %%%"));
        assert!(!verify_webhook_signature(SECRET, body, ""));
    }
}
