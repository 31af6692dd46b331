use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use spg_common::Secret;

use crate::{
    config::EversendConfig,
    data_objects::{
        CollectionFeeRequest,
        FeeQuote,
        IssuedToken,
        MomoCollectionRequest,
        OtpReceipt,
        OtpRequest,
        PayoutQuotationRequest,
        PayoutQuote,
        PayoutRequest,
        ProviderTransaction,
    },
    helpers::mask_phone,
    retry::RetryPolicy,
    token::{TokenCache, TokenSource},
    EversendApiError,
};

/// Assumed token lifetime when the provider does not declare one.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Mints bearer tokens with the client-credentials call.
#[derive(Clone)]
struct ClientCredentials {
    client: Arc<Client>,
    config: EversendConfig,
}

impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<IssuedToken, EversendApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TokenResponse {
            #[serde(default)]
            token: Option<String>,
            #[serde(default)]
            expires_in: Option<u64>,
        }
        let url = format!("{}/auth/token", self.config.base_url);
        debug!("🎫️ Requesting fresh provider token");
        let response = self
            .client
            .get(url)
            .header("clientId", self.config.client_id.reveal())
            .header("clientSecret", self.config.client_secret.reveal())
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EversendApiError::Unauthorized(message),
                s => EversendApiError::QueryError { status: s.as_u16(), message },
            });
        }
        let body = response.json::<TokenResponse>().await.map_err(|e| EversendApiError::JsonError(e.to_string()))?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EversendApiError::MissingToken("response had no 'token' field".to_string()))?;
        let expires_in = Duration::from_secs(body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        Ok(IssuedToken { token: Secret::new(token), expires_in })
    }
}

/// The outbound provider client.
///
/// Every operation attaches a bearer token from the process-wide [`TokenCache`], runs under the configured
/// [`RetryPolicy`] (transient failures only) and carries the configured hard timeout. A 401 triggers exactly one
/// token invalidation and retry with a fresh token before the failure surfaces. Request/response pairs are logged
/// with amounts and references, never credentials.
#[derive(Clone)]
pub struct EversendApi {
    config: EversendConfig,
    client: Arc<Client>,
    tokens: Arc<TokenCache<ClientCredentials>>,
    retry: RetryPolicy,
}

impl EversendApi {
    pub fn new(config: EversendConfig) -> Result<Self, EversendApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EversendApiError::Initialization(e.to_string()))?;
        let client = Arc::new(client);
        let credentials = ClientCredentials { client: Arc::clone(&client), config: config.clone() };
        let tokens = Arc::new(TokenCache::new(credentials, config.token_margin));
        let retry = RetryPolicy::default().with_max_attempts(config.max_attempts);
        Ok(Self { config, client, tokens, retry })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    pub async fn collection_fees(&self, request: &CollectionFeeRequest) -> Result<FeeQuote, EversendApiError> {
        #[derive(Deserialize)]
        struct FeeResponse {
            #[serde(default)]
            data: Option<FeeQuote>,
        }
        debug!("Requesting collection fees: {}-{}-{}", request.method, request.currency, request.amount);
        let result: FeeResponse = self.post_with_auth("/collections/fees", request, "collection_fees").await?;
        info!("Collection fee quote received for {}-{}-{}", request.method, request.currency, request.amount);
        Ok(result.data.unwrap_or_default())
    }

    pub async fn request_otp(&self, phone: &str) -> Result<OtpReceipt, EversendApiError> {
        let request = OtpRequest { phone: phone.to_string() };
        debug!("Requesting collection OTP for phone {}", mask_phone(phone));
        let receipt = self.post_with_auth("/collections/otp", &request, "request_otp").await?;
        info!("OTP issued for phone {}", mask_phone(phone));
        Ok(receipt)
    }

    pub async fn initiate_momo_collection(
        &self,
        request: &MomoCollectionRequest,
    ) -> Result<ProviderTransaction, EversendApiError> {
        debug!(
            "Initiating MoMo collection [{}]: {} {} from {}",
            request.transaction_ref,
            request.amount,
            request.currency,
            mask_phone(&request.phone)
        );
        let result: TransactionResponse =
            self.post_with_auth("/collections/momo", request, "initiate_momo_collection").await?;
        info!("MoMo collection [{}] initiated", request.transaction_ref);
        Ok(result.transaction())
    }

    pub async fn payout_quotation(&self, request: &PayoutQuotationRequest) -> Result<PayoutQuote, EversendApiError> {
        #[derive(Deserialize)]
        struct QuoteResponse {
            #[serde(default)]
            data: Option<PayoutQuote>,
        }
        debug!(
            "Requesting payout quotation: {} -> {}/{}, amount {}",
            request.source_wallet, request.destination_country, request.destination_currency, request.amount
        );
        let result: QuoteResponse = self.post_with_auth("/payouts/quotation", request, "payout_quotation").await?;
        info!("Payout quotation received for {} {}", request.amount, request.destination_currency);
        Ok(result.data.unwrap_or_default())
    }

    pub async fn payout(&self, request: &PayoutRequest) -> Result<ProviderTransaction, EversendApiError> {
        debug!("Processing payout [{}] to {}", request.transaction_ref, mask_phone(&request.phone_number));
        let result: TransactionResponse = self.post_with_auth("/payouts", request, "payout").await?;
        info!("Payout [{}] processed", request.transaction_ref);
        Ok(result.transaction())
    }

    /// POST with bearer auth under the retry policy. The 401 path refreshes the token exactly once per logical
    /// call; if the fresh token is also rejected, the failure surfaces as upstream-unavailable rather than looping.
    async fn post_with_auth<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        label: &str,
    ) -> Result<T, EversendApiError> {
        let auth_retried = AtomicBool::new(false);
        let auth_retried = &auth_retried;
        self.retry
            .run(label, |attempt| async move {
                trace!("{label}: attempt {attempt}");
                let token = self.tokens.get_token().await?;
                match self.post_request(path, body, &token).await {
                    Err(e) if e.is_auth() && !auth_retried.swap(true, Ordering::SeqCst) => {
                        warn!("{label}: provider rejected our token ({e}). Refreshing and retrying once.");
                        self.tokens.invalidate().await;
                        let token = self.tokens.get_token().await?;
                        self.post_request(path, body, &token).await.map_err(|e2| {
                            if e2.is_auth() {
                                EversendApiError::UpstreamUnavailable(format!(
                                    "{label}: authentication failed with a fresh token: {e2}"
                                ))
                            } else {
                                e2
                            }
                        })
                    },
                    Err(e) if e.is_auth() => {
                        Err(EversendApiError::UpstreamUnavailable(format!("{label}: {e}")))
                    },
                    other => other,
                }
            })
            .await
    }

    async fn post_request<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: &Secret<String>,
    ) -> Result<T, EversendApiError> {
        let url = self.url(path);
        trace!("Sending REST request: {url}");
        let response = self
            .client
            .post(url)
            .bearer_auth(token.reveal())
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            trace!("REST request successful. {status}");
            response.json::<T>().await.map_err(|e| EversendApiError::JsonError(e.to_string()))
        } else if status == StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            Err(EversendApiError::Unauthorized(message))
        } else {
            let message = response.text().await.map_err(|e| EversendApiError::ResponseError(e.to_string()))?;
            Err(EversendApiError::QueryError { status: status.as_u16(), message })
        }
    }
}

/// Collection and payout responses nest the transaction under `data`.
#[derive(Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    data: Option<TransactionData>,
}

#[derive(Deserialize)]
struct TransactionData {
    #[serde(default)]
    transaction: Option<ProviderTransaction>,
}

impl TransactionResponse {
    fn transaction(self) -> ProviderTransaction {
        self.data.and_then(|d| d.transaction).unwrap_or_default()
    }
}

/// Timeouts and connection failures are transient; anything else that broke mid-flight counts as a bad response.
fn classify_transport_error(e: reqwest::Error) -> EversendApiError {
    if e.is_timeout() || e.is_connect() {
        EversendApiError::RequestError(e.to_string())
    } else {
        EversendApiError::ResponseError(e.to_string())
    }
}
