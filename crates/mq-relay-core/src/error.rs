//! Error types for the transformation and redelivery pipeline.

use mq_relay_runtime::{MessageId, TransportError};
use thiserror::Error;

/// Boxed error returned by application handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Standard result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Comprehensive error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Unknown wire format name. Always a configuration bug.
    #[error("Unsupported format '{name}', supported: {supported}")]
    UnsupportedFormat { name: String, supported: String },

    #[error("Delivery delay {delay}s out of range (0,{max}]")]
    DeliveryDelayOutOfRange { delay: i64, max: i64 },

    #[error("Invalid {format} payload in '{field}': {message}")]
    InvalidPayload {
        field: String,
        format: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The application handler failed after the message was acknowledged.
    /// The delivery is lost unless the caller recovers it.
    #[error("Handler failed for message {message_id}: {source}")]
    Handler {
        message_id: MessageId,
        #[source]
        source: BoxError,
    },
}

impl RelayError {
    /// Check if repeating the failed operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnsupportedFormat { .. } => false,
            Self::DeliveryDelayOutOfRange { .. } => false,
            Self::InvalidPayload { .. } => false,
            Self::Configuration(_) => false,
            Self::Transport(e) => e.is_transient(),
            Self::Handler { .. } => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
