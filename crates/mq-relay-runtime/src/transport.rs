//! Transport traits implemented by concrete broker bindings.
//!
//! The adapter core only needs three capabilities from a broker: fetching a
//! batch, acknowledging receipt handles in one call, and publishing. They are
//! split into a consumer-side and a producer-side trait because a consumer
//! pairs a fetch/ack binding with the producer it requeues through.

use crate::error::TransportError;
use crate::message::{RawMessage, ReceiptHandle, RejectedHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Location of a topic subscription, used to correlate trace events with
/// broker-side logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicEndpoint {
    pub instance: String,
    pub topic: String,
    pub group: Option<String>,
    pub tag: Option<String>,
}

impl TopicEndpoint {
    /// Create endpoint for a producer (no group or tag filter)
    pub fn new(instance: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            topic: topic.into(),
            group: None,
            tag: None,
        }
    }

    /// Set consumer group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set tag filter expression
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Slash-delimited `instance/topic/group/tag/<message_id>` path
    pub fn path(&self, message_id: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.instance,
            self.topic,
            self.group.as_deref().unwrap_or_default(),
            self.tag.as_deref().unwrap_or_default(),
            message_id
        )
    }
}

/// Consumer side of a broker binding
#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    /// Fetch up to `batch` messages, waiting at most `timeout` for the first one.
    ///
    /// An empty topic may be reported either as `Ok(vec![])` or as
    /// [`TransportError::NoMessage`].
    async fn fetch(&self, batch: u32, timeout: Duration)
        -> Result<Vec<RawMessage>, TransportError>;

    /// Acknowledge every handle in one call.
    ///
    /// Returns the handles the broker refused; an empty list is full success.
    async fn acknowledge(
        &self,
        handles: &[ReceiptHandle],
    ) -> Result<Vec<RejectedHandle>, TransportError>;

    /// Subscription this binding consumes from
    fn endpoint(&self) -> &TopicEndpoint;
}

/// Producer side of a broker binding
#[async_trait]
pub trait ProducerTransport: Send + Sync {
    /// Publish a request, returning the stored message with its assigned id
    async fn publish(&self, message: RawMessage) -> Result<RawMessage, TransportError>;

    /// Topic this binding publishes to
    fn endpoint(&self) -> &TopicEndpoint;
}
