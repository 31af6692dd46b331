use std::time::Duration;

use log::*;
use spg_common::Secret;

const DEFAULT_BASE_URL: &str = "https://api.eversend.co/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TOKEN_MARGIN_SECS: u64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct EversendConfig {
    pub base_url: String,
    pub client_id: Secret<String>,
    pub client_secret: Secret<String>,
    /// Hard per-request timeout. Expiry counts as a transient failure for the retry policy.
    pub timeout: Duration,
    /// Safety margin subtracted from the provider-declared token expiry, so a cached token is never handed out
    /// moments before it lapses mid-request.
    pub token_margin: Duration,
    pub max_attempts: u32,
}

impl Default for EversendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: Secret::default(),
            client_secret: Secret::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            token_margin: Duration::from_secs(DEFAULT_TOKEN_MARGIN_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl EversendConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("SPG_EVERSEND_BASE_URL").unwrap_or_else(|_| {
            info!("SPG_EVERSEND_BASE_URL not set, using {DEFAULT_BASE_URL}");
            DEFAULT_BASE_URL.to_string()
        });
        let client_id = Secret::new(std::env::var("SPG_EVERSEND_CLIENT_ID").unwrap_or_else(|_| {
            warn!("SPG_EVERSEND_CLIENT_ID not set, using (probably useless) default");
            String::default()
        }));
        let client_secret = Secret::new(std::env::var("SPG_EVERSEND_CLIENT_SECRET").unwrap_or_else(|_| {
            warn!("SPG_EVERSEND_CLIENT_SECRET not set, using (probably useless) default");
            String::default()
        }));
        let timeout = duration_from_env("SPG_EVERSEND_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let token_margin = duration_from_env("SPG_EVERSEND_TOKEN_MARGIN_SECS", DEFAULT_TOKEN_MARGIN_SECS);
        let max_attempts = std::env::var("SPG_EVERSEND_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        Self { base_url, client_id, client_secret, timeout, token_margin, max_attempts }
    }
}

fn duration_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| warn!("Invalid value for {var}: {e}. Using the default of {default_secs}s"))
                .ok()
        })
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
