//! Application-facing message model.

use mq_relay_runtime::MessageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property carrying the sharding key in the application model
pub const SHARDING_KEY_PROPERTY: &str = "ShardingKey";

/// Requested delivery delay of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delay {
    /// Seconds from the moment of publish
    Offset(i64),
    /// Absolute deadline as unix epoch seconds
    Deadline(i64),
}

/// A message as the application sees it.
///
/// Built by the application before publish, or by the translator on receive.
/// The pipeline never mutates a message after handing it to a handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<MessageId>,
    /// Decoded text body
    pub body: Option<String>,
    pub tag: Option<String>,
    pub key: Option<String>,
    pub delay: Option<Delay>,
    pub properties: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Set tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set message key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set sharding key for ordered topics
    pub fn with_sharding_key(self, sharding_key: impl Into<String>) -> Self {
        self.with_property(SHARDING_KEY_PROPERTY, sharding_key)
    }

    /// Deliver `seconds` after publish
    pub fn with_delay_seconds(mut self, seconds: i64) -> Self {
        self.delay = Some(Delay::Offset(seconds));
        self
    }

    /// Deliver at unix epoch `seconds`
    pub fn with_deliver_at(mut self, seconds: i64) -> Self {
        self.delay = Some(Delay::Deadline(seconds));
        self
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property by exact key
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Sharding key carried in the properties, if non-empty
    pub fn sharding_key(&self) -> Option<&str> {
        self.property(SHARDING_KEY_PROPERTY).filter(|k| !k.is_empty())
    }
}
