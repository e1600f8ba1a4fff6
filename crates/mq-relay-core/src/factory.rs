//! # Named-Instance Factory
//!
//! Builds producers and consumers by the names they are given in
//! [`RelayConfig`]. The broker binding is supplied through
//! [`TransportFactory`], so the same configuration works against a real
//! broker or the in-memory topic.

use crate::config::{ConsumerSettings, ProducerSettings, RelayConfig};
use crate::consumer::Consumer;
use crate::error::{ConfigurationError, RelayResult};
use crate::producer::Producer;
use crate::rules::PropertyRules;
use crate::translator::MessageTranslator;
use mq_relay_runtime::{ConsumerTransport, InMemoryBroker, ProducerTransport, TopicEndpoint};
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

/// Creates broker bindings for configured endpoints
pub trait TransportFactory: Send + Sync {
    /// Binding that publishes to `endpoint`
    fn producer(&self, endpoint: TopicEndpoint) -> RelayResult<Arc<dyn ProducerTransport>>;

    /// Binding that fetches and acknowledges on `endpoint`
    fn consumer(&self, endpoint: TopicEndpoint) -> RelayResult<Arc<dyn ConsumerTransport>>;
}

impl TransportFactory for InMemoryBroker {
    fn producer(&self, endpoint: TopicEndpoint) -> RelayResult<Arc<dyn ProducerTransport>> {
        let topic = self.topic(&endpoint.instance, &endpoint.topic);
        Ok(Arc::new(topic.producer(endpoint)))
    }

    fn consumer(&self, endpoint: TopicEndpoint) -> RelayResult<Arc<dyn ConsumerTransport>> {
        let topic = self.topic(&endpoint.instance, &endpoint.topic);
        Ok(Arc::new(topic.consumer(endpoint)))
    }
}

/// Entry point for creating configured producers and consumers
pub struct RelayClient {
    config: RelayConfig,
    factory: Arc<dyn TransportFactory>,
    rules: Arc<PropertyRules>,
}

impl RelayClient {
    /// Create a client over a configuration, validating it first
    pub fn new(
        config: RelayConfig,
        factory: Arc<dyn TransportFactory>,
        rules: Arc<PropertyRules>,
    ) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            rules,
        })
    }

    /// Create a client with the standard rule tables
    pub fn with_standard_rules(
        config: RelayConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> RelayResult<Self> {
        Self::new(config, factory, Arc::new(PropertyRules::standard()))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Create the producer configured as `producers.<name>`
    pub fn create_producer(&self, name: &str) -> RelayResult<Producer> {
        let settings = self.producer_settings(name)?;
        let transport = self.factory.producer(settings.endpoint())?;
        let translator = self.translator(self.config.codec_for(&settings.codec));

        let mut producer = Producer::new(name, transport, translator);
        if let Some(property) = &settings.ownership_property {
            producer = producer.with_ownership_property(property);
        }

        debug!(name = name, endpoint = ?settings.endpoint(), "Created producer");
        Ok(producer)
    }

    /// Create the consumer configured as `consumers.<name>`
    pub fn create_consumer(&self, name: &str) -> RelayResult<Consumer> {
        let settings = self.consumer_settings(name)?;
        let source = self.factory.consumer(settings.endpoint())?;
        let requeue = self.factory.producer(settings.requeue_endpoint())?;
        let translator = self.translator(self.config.codec_for(&settings.codec));

        let mut consumer = Consumer::new(name, source, requeue, translator)
            .with_batch(settings.batch)
            .with_timeout(settings.timeout());
        if let Some(property) = &settings.ownership_property {
            consumer = consumer.with_ownership_property(property);
        }

        debug!(name = name, endpoint = ?settings.endpoint(), "Created consumer");
        Ok(consumer)
    }

    fn translator(&self, codec: crate::translator::CodecSettings) -> MessageTranslator {
        MessageTranslator::new(Arc::clone(&self.rules), codec)
    }

    fn producer_settings(&self, name: &str) -> RelayResult<&ProducerSettings> {
        self.config.producers.get(name).ok_or_else(|| {
            ConfigurationError::Missing {
                key: format!("producers.{name}"),
            }
            .into()
        })
    }

    fn consumer_settings(&self, name: &str) -> RelayResult<&ConsumerSettings> {
        self.config.consumers.get(name).ok_or_else(|| {
            ConfigurationError::Missing {
                key: format!("consumers.{name}"),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
