//! Transport implementations.
//!
//! Broker bindings implement [`ConsumerTransport`](crate::ConsumerTransport)
//! and [`ProducerTransport`](crate::ProducerTransport). Only the in-memory
//! binding ships with this crate.

pub mod memory;

pub use memory::{InMemoryBroker, InMemoryConfig, InMemoryTopic, InMemoryTransport};
