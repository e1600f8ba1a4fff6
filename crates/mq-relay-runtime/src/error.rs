//! Error types for transport operations.

use std::time::Duration;
use thiserror::Error;

/// Error type for all transport operations
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The topic currently holds no deliverable message. Brokers report this as
    /// a distinguished condition rather than an empty batch.
    #[error("No message available ({request_id})")]
    NoMessage { request_id: String },

    #[error("Topic not found: {instance}/{topic}")]
    TopicNotFound { instance: String, topic: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Provider error [{code}] {message} ({request_id})")]
    ProviderError {
        code: String,
        message: String,
        request_id: String,
    },
}

impl TransportError {
    /// Check if error is the benign "nothing to fetch" signal
    pub fn is_no_message(&self) -> bool {
        matches!(self, Self::NoMessage { .. })
    }

    /// Check if error is transient and the operation could succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoMessage { .. } => true,
            Self::TopicNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::BatchTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
        }
    }

    /// Request id reported by the broker, when the error carries one
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::NoMessage { request_id } | Self::ProviderError { request_id, .. } => {
                Some(request_id.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
