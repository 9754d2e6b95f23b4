use reqwest::StatusCode;
use std::fmt;

/// Non-success HTTP response from the market data provider.
#[derive(Debug, Clone)]
pub struct ProviderHttpError {
    pub provider: &'static str,
    pub endpoint: String,
    pub status: StatusCode,
    pub body: String,
}

impl ProviderHttpError {
    /// Client errors (bad key, unknown symbol, plan limits) will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !self.status.is_client_error()
    }
}

impl fmt::Display for ProviderHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} HTTP {} on {}: {}",
            self.provider, self.status, self.endpoint, self.body
        )
    }
}

impl std::error::Error for ProviderHttpError {}

/// The provider answered 2xx but the body is an error object or does not decode. Retrying the
/// same request returns the same body.
#[derive(Debug, Clone)]
pub struct ProviderPayloadError {
    pub provider: &'static str,
    pub endpoint: String,
    pub detail: String,
}

impl fmt::Display for ProviderPayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} payload: {}", self.provider, self.endpoint, self.detail)
    }
}

impl std::error::Error for ProviderPayloadError {}

/// Transport failures and 5xx/429 responses are worth another attempt; bad payloads and other
/// client errors are not.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<ProviderPayloadError>().is_some() {
        return false;
    }
    err.downcast_ref::<ProviderHttpError>()
        .map_or(true, ProviderHttpError::is_retryable)
}
