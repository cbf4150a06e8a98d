use thiserror::Error;

pub type FunnelResult<T> = Result<T, FunnelError>;

/// Visitor input that failed a local format check. Always recoverable: the
/// message is re-presented and the visitor may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a valid 5-digit ZIP code (got {normalized:?})")]
    PostalCode { normalized: String },

    #[error("Invalid email address")]
    Email,
}

/// Failure of an items or zip-metadata source. Recovered by substituting an
/// empty result.
#[derive(Error, Debug)]
pub enum DataFetchError {
    #[error("Request to {source_name} failed: {message}")]
    Transport { source_name: String, message: String },

    #[error("{source_name} responded with status {status}")]
    Status { source_name: String, status: u16 },

    #[error("Could not decode {source_name} response: {message}")]
    Decode { source_name: String, message: String },
}

/// Failure of the downstream lead webhook. Logged only.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Webhook URL is not configured")]
    NotConfigured,

    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Data fetch error: {0}")]
    DataFetch(#[from] DataFetchError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
