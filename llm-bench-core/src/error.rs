use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        CoreError::Dataset(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Failure of a single call to a text-generation or embedding provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider asked us to slow down.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Server-side or otherwise temporary failure.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// The call did not complete within the per-call timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Transient(_)
                | ProviderError::Timeout(_)
                | ProviderError::Network(_)
        )
    }

    /// Delay requested by the provider, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Terminal outcome of a `generate` call after the retry policy has run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: ProviderError },

    #[error("Permanent provider error: {0}")]
    Permanent(ProviderError),
}

impl GenerationError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, GenerationError::Permanent(_))
    }

    pub fn provider_error(&self) -> &ProviderError {
        match self {
            GenerationError::Exhausted { last, .. } => last,
            GenerationError::Permanent(err) => err,
        }
    }
}
