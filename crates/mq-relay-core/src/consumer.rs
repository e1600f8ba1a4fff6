//! # Consumer Pipeline
//!
//! One call to [`Consumer::consume`] runs a single cycle:
//! fetch a batch, acknowledge it, drop copies owned by another group,
//! dispatch each remaining message to the handler and requeue the ones the
//! handler asked to see again.
//!
//! The consumer owns no loop or scheduler. The caller decides the cadence and
//! stops by not calling again.
//!
//! ## Delivery guarantee
//!
//! Messages are acknowledged *before* the handler runs. If the handler fails,
//! or a message cannot be translated, the error propagates to the caller and
//! the remaining messages of the batch are not dispatched. The broker already
//! considers all of them delivered, so they are lost unless the caller keeps
//! its own record. This is at-most-once delivery.

use crate::error::{RelayError, RelayResult};
use crate::handler::MessageHandler;
use crate::trace::TraceEvent;
use crate::translator::MessageTranslator;
use mq_relay_runtime::{
    ConsumerTransport, MessageId, ProducerTransport, RawMessage, ReceiptHandle, RejectedHandle,
    TopicEndpoint,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Ownership value accepted by every group
pub const ANY_OWNER: &str = "*";

pub const DEFAULT_BATCH: u32 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Cycle Report
// ============================================================================

/// What happened during one consume cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Messages returned by the fetch
    pub fetched: usize,
    /// Handles the broker refused to acknowledge
    pub rejected: Vec<RejectedHandle>,
    /// Messages owned by another group
    pub dropped: Vec<MessageId>,
    /// Messages passed to the handler
    pub handled: Vec<MessageId>,
    /// `(delivered id, requeued id)` for every retry published
    pub requeued: Vec<(MessageId, MessageId)>,
}

impl CycleReport {
    /// Check if the cycle fetched nothing
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Runs consume cycles against one subscription
pub struct Consumer {
    name: String,
    source: Arc<dyn ConsumerTransport>,
    requeue: Arc<dyn ProducerTransport>,
    translator: MessageTranslator,
    batch: u32,
    timeout: Duration,
    ownership_property: Option<String>,
}

impl Consumer {
    /// Create consumer reading from `source` and requeueing through `requeue`
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ConsumerTransport>,
        requeue: Arc<dyn ProducerTransport>,
        translator: MessageTranslator,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            requeue,
            translator,
            batch: DEFAULT_BATCH,
            timeout: DEFAULT_TIMEOUT,
            ownership_property: None,
        }
    }

    /// Set maximum messages per fetch
    pub fn with_batch(mut self, batch: u32) -> Self {
        self.batch = batch;
        self
    }

    /// Set how long a fetch waits for the first message
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable the ownership filter on `property`.
    ///
    /// The claim is compared as plain text, so the translator carries the
    /// property without codec transformation.
    pub fn with_ownership_property(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        if property.is_empty() {
            self.ownership_property = None;
            return self;
        }
        self.translator = self.translator.with_verbatim_key(property.clone());
        self.ownership_property = Some(property);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscription this consumer reads from
    pub fn endpoint(&self) -> &TopicEndpoint {
        self.source.endpoint()
    }

    /// Consumer group identity
    pub fn group(&self) -> &str {
        self.endpoint().group.as_deref().unwrap_or_default()
    }

    pub fn translator(&self) -> &MessageTranslator {
        &self.translator
    }

    /// Run one fetch / ack / filter / dispatch / requeue cycle.
    ///
    /// Fetch failures are logged and end the cycle with an empty report. A
    /// failed acknowledge call, a translation failure, a handler failure or a
    /// failed requeue ends the cycle with an error.
    pub async fn consume(&self, handler: &dyn MessageHandler) -> RelayResult<CycleReport> {
        let mut report = CycleReport::default();

        let fetched = self.fetch().await;
        if fetched.is_empty() {
            return Ok(report);
        }
        report.fetched = fetched.len();

        report.rejected = self.acknowledge(&fetched).await?;
        let refused: HashSet<&ReceiptHandle> = report.rejected.iter().map(|r| &r.handle).collect();
        let accepted: Vec<RawMessage> = fetched
            .into_iter()
            .filter(|m| {
                m.receipt_handle
                    .as_ref()
                    .map_or(true, |handle| !refused.contains(handle))
            })
            .collect();

        for message in accepted {
            let id = message.id.clone().unwrap_or_else(|| MessageId::new(""));

            if let Some(owner) = self.foreign_owner(&message) {
                warn!(
                    event = %TraceEvent::Drop,
                    path = %self.endpoint().path(id.as_str()),
                    tag = message.tag.as_deref().unwrap_or_default(),
                    owner = owner,
                    "Dropping message owned by another group"
                );
                report.dropped.push(id);
                continue;
            }

            let translated = self.translator.to_message(&message)?;
            let delay = handler
                .handle(&translated)
                .await
                .map_err(|source| RelayError::Handler {
                    message_id: id.clone(),
                    source,
                })?;
            report.handled.push(id.clone());

            if delay > 0 {
                let requeued = self.requeue(&message, delay).await?;
                report.requeued.push((id, requeued));
            }
        }

        Ok(report)
    }

    async fn fetch(&self) -> Vec<RawMessage> {
        let endpoint = self.endpoint();
        match self.source.fetch(self.batch, self.timeout).await {
            Ok(messages) => {
                for message in &messages {
                    debug!(
                        event = %TraceEvent::Consume,
                        path = %endpoint.path(message.id_str()),
                        tag = message.tag.as_deref().unwrap_or_default(),
                        consumed_times = message.consumed_times,
                        "Fetched message"
                    );
                }
                messages
            }
            Err(e) if e.is_no_message() => {
                debug!(
                    event = %TraceEvent::Consume,
                    path = %endpoint.path(""),
                    request_id = e.request_id().unwrap_or_default(),
                    "No message available"
                );
                Vec::new()
            }
            Err(e) => {
                error!(
                    event = %TraceEvent::Consume,
                    path = %endpoint.path(""),
                    error = %e,
                    "Fetch failed, skipping cycle"
                );
                Vec::new()
            }
        }
    }

    /// Acknowledge the batch in one call, returning the refused handles
    async fn acknowledge(&self, fetched: &[RawMessage]) -> RelayResult<Vec<RejectedHandle>> {
        let handles: Vec<ReceiptHandle> = fetched
            .iter()
            .filter_map(|m| m.receipt_handle.clone())
            .collect();
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let rejected = self.source.acknowledge(&handles).await?;
        for rejection in &rejected {
            let message_id = fetched
                .iter()
                .find(|m| m.receipt_handle.as_ref() == Some(&rejection.handle))
                .map(|m| m.id_str().to_string())
                .unwrap_or_else(|| format!("ReceiptHandle:{}", rejection.handle));
            warn!(
                event = %TraceEvent::BadAck,
                path = %self.endpoint().path(&message_id),
                error_code = %rejection.error_code,
                error_message = %rejection.error_message,
                request_id = %rejection.request_id,
                "Broker refused acknowledgement, skipping message"
            );
        }
        Ok(rejected)
    }

    /// Ownership claim on `message` naming a group other than ours
    fn foreign_owner<'m>(&self, message: &'m RawMessage) -> Option<&'m str> {
        let key = self.ownership_property.as_deref()?;
        message
            .property(key)
            .filter(|owner| !owner.is_empty() && *owner != ANY_OWNER && *owner != self.group())
    }

    async fn requeue(&self, message: &RawMessage, delay: u64) -> RelayResult<MessageId> {
        let delay = i64::try_from(delay).unwrap_or(i64::MAX);
        let mut request = self.translator.to_retry_request(message, delay)?;
        if let Some(key) = &self.ownership_property {
            // The retried copy belongs to the group that asked for it
            request
                .properties
                .insert(key.clone(), self.group().to_string());
        }

        let published = self.requeue.publish(request).await?;
        let requeued = published.id.unwrap_or_else(|| MessageId::new(""));
        let target = self.requeue.endpoint();
        info!(
            event = %TraceEvent::RePublish,
            path = %self.endpoint().path(message.id_str()),
            target = %format!("{}/{}/{}", target.instance, target.topic, requeued),
            tag = message.tag.as_deref().unwrap_or_default(),
            delay_secs = delay,
            "Requeued message for retry"
        );
        Ok(requeued)
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("endpoint", self.endpoint())
            .field("batch", &self.batch)
            .field("timeout", &self.timeout)
            .field("ownership_property", &self.ownership_property)
            .finish()
    }
}
