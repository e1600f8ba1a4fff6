//! Transport-facing message types and identifiers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Broker-assigned identifier of a single message delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an identifier issued by the broker
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier (used by in-process transports)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Opaque single-use token proving receipt of one specific delivery.
///
/// A handle is required to acknowledge the delivery. Once the broker
/// redelivers the message the previous handle is no longer accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a handle string issued by the broker
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time as unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert unix epoch milliseconds into a UTC datetime, if representable
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Property the broker uses to echo the message key
pub const KEYS_PROPERTY: &str = "KEYS";
/// Property the broker uses to echo the sharding key
pub const SHARDING_KEY_PROPERTY: &str = "__SHARDINGKEY";
/// Property the broker uses to echo the scheduled delivery time
pub const START_DELIVER_TIME_PROPERTY: &str = "__STARTDELIVERTIME";

// ============================================================================
// Message Types
// ============================================================================

/// A message as the broker represents it.
///
/// Used in both directions: the broker fills every field on delivery, while an
/// outbound publish request only sets body, tag, key, sharding key, start
/// deliver time and properties. All timestamps are unix epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Option<MessageId>,
    /// Wire-encoded body
    pub body: Option<String>,
    pub tag: Option<String>,
    pub key: Option<String>,
    pub sharding_key: Option<String>,
    pub receipt_handle: Option<ReceiptHandle>,
    pub body_md5: Option<String>,
    pub consumed_times: u32,
    pub first_consume_time: Option<i64>,
    pub next_consume_time: Option<i64>,
    pub publish_time: Option<i64>,
    /// Scheduled delivery time for outbound requests
    pub start_deliver_time: Option<i64>,
    pub properties: HashMap<String, String>,
}

impl RawMessage {
    /// Create an outbound request with body and tag
    pub fn new(body: Option<String>, tag: Option<String>) -> Self {
        Self {
            body,
            tag,
            ..Self::default()
        }
    }

    /// Set message identifier
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set message key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set sharding key for ordered topics
    pub fn with_sharding_key(mut self, sharding_key: impl Into<String>) -> Self {
        self.sharding_key = Some(sharding_key.into());
        self
    }

    /// Set receipt handle of the delivery
    pub fn with_receipt_handle(mut self, handle: ReceiptHandle) -> Self {
        self.receipt_handle = Some(handle);
        self
    }

    /// Set broker consumed-count
    pub fn with_consumed_times(mut self, consumed_times: u32) -> Self {
        self.consumed_times = consumed_times;
        self
    }

    /// Set publish time in epoch milliseconds
    pub fn with_publish_time(mut self, millis: i64) -> Self {
        self.publish_time = Some(millis);
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

    /// Identifier as a string, empty when the broker has not assigned one yet
    pub fn id_str(&self) -> &str {
        self.id.as_ref().map(MessageId::as_str).unwrap_or_default()
    }
}

/// A receipt handle the broker refused to acknowledge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedHandle {
    pub handle: ReceiptHandle,
    pub error_code: String,
    pub error_message: String,
    pub request_id: String,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
