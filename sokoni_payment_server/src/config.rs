use std::env;

use eversend_tools::EversendConfig;
use log::*;
use spg_common::{parse_boolean_flag, Secret};
use sokoni_payment_engine::DEFAULT_COMMISSION_RATE_BPS;

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8460;
const DEFAULT_HMAC_HEADER: &str = "x-eversend-signature";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub webhook: WebhookConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Platform commission on completed transactions, in basis points of the transaction amount.
    pub commission_rate_bps: i64,
    /// Outbound provider configuration.
    pub eversend: EversendConfig,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// The header carrying the webhook signature.
    pub hmac_header: String,
    pub hmac_secret: Secret<String>,
    /// When false, signature checks are skipped entirely. Local development only.
    pub hmac_checks: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { hmac_header: DEFAULT_HMAC_HEADER.to_string(), hmac_secret: Secret::default(), hmac_checks: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            webhook: WebhookConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            commission_rate_bps: DEFAULT_COMMISSION_RATE_BPS,
            eversend: EversendConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let webhook = WebhookConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("SPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SPG_USE_FORWARDED").ok(), false);
        let commission_rate_bps = env::var("SPG_COMMISSION_RATE_BPS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("🪛️ Invalid value for SPG_COMMISSION_RATE_BPS. {e}"))
                    .ok()
            })
            .filter(|rate| (0..10_000).contains(rate))
            .unwrap_or(DEFAULT_COMMISSION_RATE_BPS);
        let eversend = EversendConfig::new_from_env_or_default();
        Self { host, port, database_url, webhook, use_x_forwarded_for, use_forwarded, commission_rate_bps, eversend }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_header = env::var("SPG_WEBHOOK_HMAC_HEADER").unwrap_or_else(|_| DEFAULT_HMAC_HEADER.to_string());
        let hmac_secret = env::var("SPG_WEBHOOK_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SPG_WEBHOOK_HMAC_SECRET is not set. Please set it to the shared secret for webhook signatures."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("SPG_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Do NOT run production like this.");
        }
        Self { hmac_header, hmac_secret, hmac_checks }
    }
}

//-------------------------------------------------  ProxyOptions  -----------------------------------------------------
/// The subset of the configuration that request handlers need to resolve client IP addresses. Kept small and free
/// of secrets so it can be cloned into application data.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ProxyOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

//-----------------------------------------------  CommissionOptions  --------------------------------------------------
#[derive(Clone, Copy, Debug)]
pub struct CommissionOptions {
    pub rate_bps: i64,
}

impl CommissionOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { rate_bps: config.commission_rate_bps }
    }
}
