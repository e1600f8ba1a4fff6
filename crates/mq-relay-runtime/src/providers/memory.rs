//! In-memory topic transport for testing and development.
//!
//! This module provides a broker stand-in that behaves like the HTTP topic
//! brokers the adapter targets:
//! - Fetch waits up to the requested timeout and reports an empty topic as
//!   [`TransportError::NoMessage`]
//! - Delivered messages stay invisible until acknowledged or until their
//!   visibility window lapses, after which they are redelivered with a new
//!   receipt handle and the previous handle is refused on acknowledgment
//! - Scheduled publishes become deliverable at their start deliver time
//! - Structural fields are echoed as `KEYS`, `__SHARDINGKEY` and
//!   `__STARTDELIVERTIME` properties on delivery
//!
//! Consumers and producers created from the same [`InMemoryTopic`] share its
//! storage, so a requeue published by a consumer is fetched by that consumer.

use crate::error::TransportError;
use crate::message::{
    now_millis, MessageId, RawMessage, ReceiptHandle, RejectedHandle, KEYS_PROPERTY,
    SHARDING_KEY_PROPERTY, START_DELIVER_TIME_PROPERTY,
};
use crate::transport::{ConsumerTransport, ProducerTransport, TopicEndpoint};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// In-memory transport configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Largest batch a single fetch may request
    pub max_batch_size: u32,
    /// How long a delivered message stays invisible before redelivery
    pub visibility_timeout: Duration,
    /// Publish requests kept for inspection, oldest discarded first
    pub published_history: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 16,
            visibility_timeout: Duration::from_secs(300),
            published_history: 1024,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the topic with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message: RawMessage,
    available_at: i64,
}

/// A delivered message awaiting acknowledgment
struct InFlightMessage {
    stored: StoredMessage,
    visible_at: i64,
}

#[derive(Default)]
struct TopicStorage {
    /// Published messages in arrival order, including scheduled ones
    messages: VecDeque<StoredMessage>,
    /// Delivered messages keyed by their current receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    /// Most recent publish requests accepted, in order
    published: VecDeque<RawMessage>,
    acknowledged: usize,
}

impl TopicStorage {
    /// Return lapsed in-flight messages to the topic; their handles die
    fn reclaim_expired(&mut self, now: i64) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(entry) = self.in_flight.remove(&handle) {
                self.messages.push_back(entry.stored);
            }
        }
    }

    fn deliver(&mut self, batch: u32, now: i64, visibility: Duration) -> Vec<RawMessage> {
        self.reclaim_expired(now);

        let mut delivered = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.messages.len());

        while let Some(mut stored) = self.messages.pop_front() {
            if delivered.len() as u32 >= batch || stored.available_at > now {
                remaining.push_back(stored);
                continue;
            }

            let handle = ReceiptHandle::new(uuid::Uuid::new_v4().to_string());
            let visible_at = now + visibility.as_millis() as i64;
            let message = &mut stored.message;
            message.consumed_times += 1;
            message.first_consume_time.get_or_insert(now);
            message.next_consume_time = Some(visible_at);
            message.receipt_handle = Some(handle.clone());

            delivered.push(message.clone());
            self.in_flight.insert(
                handle.as_str().to_string(),
                InFlightMessage { stored, visible_at },
            );
        }

        self.messages = remaining;
        delivered
    }
}

// ============================================================================
// InMemoryTopic
// ============================================================================

/// Shared storage for one in-memory topic
#[derive(Clone)]
pub struct InMemoryTopic {
    storage: Arc<Mutex<TopicStorage>>,
    notify: Arc<Notify>,
    config: InMemoryConfig,
}

impl InMemoryTopic {
    /// Create an empty topic
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(TopicStorage::default())),
            notify: Arc::new(Notify::new()),
            config,
        }
    }

    /// Create a consumer-side binding on this topic
    pub fn consumer(&self, endpoint: TopicEndpoint) -> InMemoryTransport {
        InMemoryTransport {
            topic: self.clone(),
            endpoint,
        }
    }

    /// Create a producer-side binding on this topic
    pub fn producer(&self, endpoint: TopicEndpoint) -> InMemoryTransport {
        self.consumer(endpoint)
    }

    /// Number of messages waiting (deliverable or scheduled)
    pub fn pending_count(&self) -> usize {
        self.lock().map(|s| s.messages.len()).unwrap_or_default()
    }

    /// Number of delivered messages not yet acknowledged
    pub fn in_flight_count(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or_default()
    }

    /// Number of successfully acknowledged deliveries
    pub fn acknowledged_count(&self) -> usize {
        self.lock().map(|s| s.acknowledged).unwrap_or_default()
    }

    /// Messages accepted by publish, in order, up to
    /// [`InMemoryConfig::published_history`] of the most recent
    pub fn published(&self) -> Vec<RawMessage> {
        self.lock()
            .map(|s| s.published.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every scheduled message deliverable now
    pub fn release_scheduled(&self) {
        if let Ok(mut storage) = self.lock() {
            let now = now_millis();
            for stored in storage.messages.iter_mut() {
                stored.available_at = stored.available_at.min(now);
            }
        }
        self.notify.notify_waiters();
    }

    /// Lapse the visibility window of one delivery so its handle is refused
    /// and the message returns to the topic
    pub fn expire_receipt(&self, handle: &ReceiptHandle) -> bool {
        let Ok(mut storage) = self.lock() else {
            return false;
        };
        match storage.in_flight.remove(handle.as_str()) {
            Some(entry) => {
                storage.messages.push_back(entry.stored);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TopicStorage>, TransportError> {
        self.storage
            .lock()
            .map_err(|_| TransportError::ProviderError {
                code: "StoragePoisoned".to_string(),
                message: "in-memory topic storage lock poisoned".to_string(),
                request_id: request_id(),
            })
    }
}

impl Default for InMemoryTopic {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

fn request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

// ============================================================================
// InMemoryBroker
// ============================================================================

/// Registry of in-memory topics keyed by instance and topic name
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<(String, String), InMemoryTopic>>>,
    config: InMemoryConfig,
}

impl InMemoryBroker {
    /// Create broker whose topics use the given configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Get or create a topic
    pub fn topic(&self, instance: &str, topic: &str) -> InMemoryTopic {
        let key = (instance.to_string(), topic.to_string());
        match self.topics.lock() {
            Ok(mut topics) => topics
                .entry(key)
                .or_insert_with(|| InMemoryTopic::new(self.config.clone()))
                .clone(),
            // A poisoned registry still hands out a working, unshared topic
            Err(_) => InMemoryTopic::new(self.config.clone()),
        }
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// Consumer and producer binding on an [`InMemoryTopic`]
#[derive(Clone)]
pub struct InMemoryTransport {
    topic: InMemoryTopic,
    endpoint: TopicEndpoint,
}

impl InMemoryTransport {
    /// Underlying topic
    pub fn topic(&self) -> &InMemoryTopic {
        &self.topic
    }
}

#[async_trait]
impl ConsumerTransport for InMemoryTransport {
    async fn fetch(
        &self,
        batch: u32,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, TransportError> {
        let max_size = self.topic.config.max_batch_size;
        if batch > max_size {
            return Err(TransportError::BatchTooLarge {
                size: batch as usize,
                max_size: max_size as usize,
            });
        }
        let batch = batch.max(1);
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a publish in between is not missed
            let notified = self.topic.notify.notified();

            let delivered = {
                let mut storage = self.topic.lock()?;
                storage.deliver(batch, now_millis(), self.topic.config.visibility_timeout)
            };
            if !delivered.is_empty() {
                debug!(
                    topic = %self.endpoint.topic,
                    count = delivered.len(),
                    "Delivered messages from in-memory topic"
                );
                return Ok(delivered);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::NoMessage {
                    request_id: request_id(),
                });
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    async fn acknowledge(
        &self,
        handles: &[ReceiptHandle],
    ) -> Result<Vec<RejectedHandle>, TransportError> {
        let mut storage = self.topic.lock()?;
        storage.reclaim_expired(now_millis());

        let request = request_id();
        let mut rejected = Vec::new();
        for handle in handles {
            if storage.in_flight.remove(handle.as_str()).is_some() {
                storage.acknowledged += 1;
            } else {
                rejected.push(RejectedHandle {
                    handle: handle.clone(),
                    error_code: "ReceiptHandleError".to_string(),
                    error_message: "The receipt handle has expired or is invalid".to_string(),
                    request_id: request.clone(),
                });
            }
        }

        Ok(rejected)
    }

    fn endpoint(&self) -> &TopicEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ProducerTransport for InMemoryTransport {
    async fn publish(&self, message: RawMessage) -> Result<RawMessage, TransportError> {
        let now = now_millis();
        let mut stored = message.clone();
        stored.id = Some(MessageId::generate());
        stored.publish_time = Some(now);
        stored.consumed_times = 0;
        stored.receipt_handle = None;
        stored.first_consume_time = None;
        stored.next_consume_time = None;

        if let Some(key) = stored.key.clone().filter(|k| !k.is_empty()) {
            stored.properties.insert(KEYS_PROPERTY.to_string(), key);
        }
        if let Some(sharding) = stored.sharding_key.clone().filter(|k| !k.is_empty()) {
            stored
                .properties
                .insert(SHARDING_KEY_PROPERTY.to_string(), sharding);
        }
        if let Some(at) = stored.start_deliver_time {
            stored
                .properties
                .insert(START_DELIVER_TIME_PROPERTY.to_string(), at.to_string());
        }

        let available_at = stored.start_deliver_time.unwrap_or(now);
        {
            let mut storage = self.topic.lock()?;
            storage.published.push_back(stored.clone());
            while storage.published.len() > self.topic.config.published_history {
                storage.published.pop_front();
            }
            storage.messages.push_back(StoredMessage {
                message: stored.clone(),
                available_at,
            });
        }
        self.topic.notify.notify_waiters();

        Ok(stored)
    }

    fn endpoint(&self) -> &TopicEndpoint {
        &self.endpoint
    }
}
