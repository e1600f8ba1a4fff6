//! # MQ Relay Runtime
//!
//! Transport surface for the mq-relay message adapter.
//!
//! This library provides:
//! - Broker-facing message types and identifiers
//! - The consumer and producer traits a broker binding implements
//! - An in-memory topic for development and tests
//!
//! ## Module Organization
//!
//! - [error] - Error types for transport operations
//! - [message] - Raw messages, receipt handles and rejected handles
//! - [transport] - Transport traits and topic endpoints
//! - [providers] - Transport implementations

pub mod error;
pub mod message;
pub mod providers;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use error::TransportError;
pub use message::{
    millis_to_datetime, now_millis, MessageId, RawMessage, ReceiptHandle, RejectedHandle,
    KEYS_PROPERTY, SHARDING_KEY_PROPERTY, START_DELIVER_TIME_PROPERTY,
};
pub use providers::{InMemoryBroker, InMemoryConfig, InMemoryTopic, InMemoryTransport};
pub use transport::{ConsumerTransport, ProducerTransport, TopicEndpoint};
