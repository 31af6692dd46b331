use thiserror::Error;

#[derive(Debug, Error)]
pub enum EversendApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the provider: {0}")]
    RequestError(String),
    #[error("Invalid REST response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The provider rejected our credentials: {0}")]
    Unauthorized(String),
    #[error("The token response did not contain a usable token: {0}")]
    MissingToken(String),
    #[error("The provider is unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl EversendApiError {
    /// Transient failures are worth retrying: connection trouble, timeouts, and 5xx responses.
    /// Everything else either needs a fresh token ([`EversendApiError::Unauthorized`]) or is final.
    pub fn is_transient(&self) -> bool {
        match self {
            EversendApiError::RequestError(_) | EversendApiError::ResponseError(_) => true,
            EversendApiError::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, EversendApiError::Unauthorized(_))
    }
}
