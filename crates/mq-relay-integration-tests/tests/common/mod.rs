//! Common test utilities for mq-relay integration tests
//!
//! This module provides:
//! - A recording handler with a scripted sequence of retry delays
//! - Builders for clients wired to an in-memory broker

use async_trait::async_trait;
use mq_relay_core::{
    BoxError, ConsumerSettings, Message, MessageHandler, ProducerSettings, RelayClient,
    RelayConfig,
};
use mq_relay_runtime::InMemoryBroker;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const INSTANCE: &str = "inst-1";
pub const TOPIC: &str = "orders";
pub const OWNER_PROPERTY: &str = "Owner";

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler that records every message and answers from a delay script.
///
/// Once the script runs out every further message is accepted with delay 0.
#[derive(Default)]
pub struct ScriptedHandler {
    seen: Mutex<Vec<Message>>,
    delays: Mutex<VecDeque<u64>>,
}

impl ScriptedHandler {
    pub fn with_delays(delays: impl IntoIterator<Item = u64>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            delays: Mutex::new(delays.into_iter().collect()),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn bodies(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| m.body)
            .collect()
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&self, message: &Message) -> Result<u64, BoxError> {
        self.seen.lock().unwrap().push(message.clone());
        Ok(self.delays.lock().unwrap().pop_front().unwrap_or(0))
    }
}

// ============================================================================
// Client Builders
// ============================================================================

/// Configuration with one producer and one consumer per listed group, all on
/// the shared test topic and sharing the ownership property
pub fn config_for_groups(groups: &[&str]) -> RelayConfig {
    let mut config = RelayConfig::default();
    let mut producer = ProducerSettings::new(INSTANCE, TOPIC);
    producer.ownership_property = Some(OWNER_PROPERTY.to_string());
    config.producers.insert(TOPIC.to_string(), producer);

    for group in groups {
        let mut consumer = ConsumerSettings::new(INSTANCE, TOPIC, *group);
        consumer.timeout = 0;
        consumer.batch = 8;
        consumer.ownership_property = Some(OWNER_PROPERTY.to_string());
        config.consumers.insert(group.to_string(), consumer);
    }
    config
}

/// Client over `broker` with the standard rule tables
pub fn client(broker: &InMemoryBroker, config: RelayConfig) -> RelayClient {
    RelayClient::with_standard_rules(config, Arc::new(broker.clone()))
        .expect("Test configuration should be valid")
}
