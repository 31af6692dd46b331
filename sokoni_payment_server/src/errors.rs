use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use eversend_tools::EversendApiError;
use sokoni_payment_engine::{eversend_types::ValidationError, LedgerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidWebhookSignature,
    #[error("Invalid payload: {0}")]
    PayloadValidationError(#[from] ValidationError),
    #[error("Insufficient balance. {0}")]
    InsufficientBalance(String),
    #[error("The payment provider is unavailable. {0}")]
    UpstreamUnavailable(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::PayloadValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::InsufficientBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Storage failures surface as 500s so the provider redelivers; idempotency makes the redelivery safe.
impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<EversendApiError> for ServerError {
    fn from(e: EversendApiError) -> Self {
        match e {
            // The provider rejected the request itself; the caller can fix and resubmit.
            EversendApiError::QueryError { status, message } if status < 500 => {
                Self::InvalidRequestBody(format!("Provider rejected the request ({status}): {message}"))
            },
            e => Self::UpstreamUnavailable(e.to_string()),
        }
    }
}
