//! Error types for the detection history lambda

use thiserror::Error;

/// Result type alias using the fncloud Error
pub type Result<T> = std::result::Result<T, Error>;

/// fncloud error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invocation payload rejected before any external call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration value could not be interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vendor client construction, configuration or paging failed
    #[error("Client error: {0}")]
    Client(String),

    /// Downstream sink rejected a batch
    #[error("Sink error: {0}")]
    Sink(String),

    /// JSON Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fetch-and-send failed after validation passed
    #[error("Failure: FetchAndSendDetections: checkpoint: {checkpoint} error: {source}")]
    FetchFailed {
        checkpoint: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the error code used in structured logs
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Config(_) => "config_error",
            Error::Client(_) => "client_error",
            Error::Sink(_) => "sink_error",
            Error::Serialization(_) => "serialization_error",
            Error::FetchFailed { .. } => "fetch_failed",
        }
    }

    /// Whether the caller may retry the invocation with the same payload
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::InvalidInput(_))
    }
}
