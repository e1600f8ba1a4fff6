//! Publishes application messages to one topic.

use crate::error::RelayResult;
use crate::message::Message;
use crate::trace::TraceEvent;
use crate::translator::MessageTranslator;
use mq_relay_runtime::{MessageId, ProducerTransport, TopicEndpoint};
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Application-facing publisher.
///
/// Transport failures propagate unchanged; the producer never retries.
pub struct Producer {
    name: String,
    transport: Arc<dyn ProducerTransport>,
    translator: MessageTranslator,
}

impl Producer {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn ProducerTransport>,
        translator: MessageTranslator,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            translator,
        }
    }

    /// Publish `property` as a plain-text group ownership claim
    pub fn with_ownership_property(mut self, property: impl Into<String>) -> Self {
        self.translator = self.translator.with_verbatim_key(property);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic this producer publishes to
    pub fn endpoint(&self) -> &TopicEndpoint {
        self.transport.endpoint()
    }

    pub fn translator(&self) -> &MessageTranslator {
        &self.translator
    }

    /// Encode and publish `message`, returning the id the broker assigned
    pub async fn publish(&self, message: &Message) -> RelayResult<MessageId> {
        let request = self.translator.to_publish_request(message)?;
        let published = self.transport.publish(request).await?;
        let id = published.id.unwrap_or_else(|| MessageId::new(""));

        info!(
            event = %TraceEvent::Publish,
            path = %self.endpoint().path(id.as_str()),
            tag = message.tag.as_deref().unwrap_or_default(),
            "Published message"
        );
        Ok(id)
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("endpoint", self.endpoint())
            .finish()
    }
}
