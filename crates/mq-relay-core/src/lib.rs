//! # MQ Relay Core
//!
//! Message transformation and redelivery pipeline between an application's
//! message model and a topic broker's wire representation.
//!
//! This library provides:
//! - Raw, base64 and hex wire encodings under a configurable charset
//! - Declarative property rule tables (injectors and mappers)
//! - Inbound, publish and retry message translation
//! - A single-cycle consumer pipeline with partial-ack recovery, group
//!   ownership filtering and delayed requeue
//! - A producer and a factory creating both by configured name
//!
//! ## Module Organization
//!
//! - [codec] - Wire formats and charsets
//! - [rules] - Property rule tables and well-known property names
//! - [translator] - Broker/application message conversion
//! - [retry] - Requeue envelope and delivery delay bound
//! - [consumer] - Consume cycle
//! - [producer] - Publishing
//! - [handler] - Application handler contract and adapters
//! - [config] - Layered configuration
//! - [factory] - Named producer and consumer creation
//! - [trace] - Structured trace event names
//! - [error] - Error types

pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod factory;
pub mod handler;
pub mod message;
pub mod producer;
pub mod retry;
pub mod rules;
pub mod trace;
pub mod translator;

// Re-export commonly used types at crate root for convenience
pub use codec::{decode, encode, Charset, WireFormat};
pub use config::{CodecOverrides, ConsumerSettings, ProducerSettings, RelayConfig};
pub use consumer::{Consumer, CycleReport};
pub use error::{BoxError, ConfigurationError, RelayError, RelayResult};
pub use factory::{RelayClient, TransportFactory};
pub use handler::{handler_fn, legacy_bool_handler, legacy_unit_handler, MessageHandler};
pub use message::{Delay, Message};
pub use producer::Producer;
pub use retry::{verify_delay_in_range, Provenance, MAX_DELIVER_OFFSET_SECS};
pub use rules::{InjectorRule, MapperRule, PropertyRules, PropertyRulesBuilder};
pub use trace::TraceEvent;
pub use translator::{CodecSettings, MessageTranslator};

pub use mq_relay_runtime;
