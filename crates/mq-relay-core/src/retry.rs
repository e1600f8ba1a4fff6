//! # Retry Envelope Builder
//!
//! Builds the requeue request for a delivery the handler asked to see again.
//!
//! The requeue keeps the already wire-encoded body and carries four
//! provenance properties across the whole redelivery chain:
//! - `_OrginId`: id of the first message in the chain
//! - `_ChainId`: id of the hop that requested this retry
//! - `_OrginPublishTime`: publish time of the first message (epoch ms)
//! - `_TotalConsumedTimes`: deliveries across the chain, incremented per hop

use crate::error::{RelayError, RelayResult};
use crate::rules::{
    CHAIN_ID_PROPERTY, ORIGIN_ID_PROPERTY, ORIGIN_PUBLISH_TIME_PROPERTY,
    TOTAL_CONSUMED_TIMES_PROPERTY,
};
use crate::translator::{inject, CopyPass, MessageTranslator, Remainder};
use mq_relay_runtime::{now_millis, RawMessage};
use std::collections::HashMap;

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Longest delivery delay the broker accepts: 72 hours
pub const MAX_DELIVER_OFFSET_SECS: i64 = 72 * 3600;

/// Check that `delay` seconds lies in `(0, 72h]`
pub fn verify_delay_in_range(delay: i64) -> RelayResult<()> {
    if delay <= 0 || delay > MAX_DELIVER_OFFSET_SECS {
        return Err(RelayError::DeliveryDelayOutOfRange {
            delay,
            max: MAX_DELIVER_OFFSET_SECS,
        });
    }
    Ok(())
}

/// Provenance of a message that has been requeued at least once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub origin_id: String,
    pub chain_id: String,
    /// Epoch milliseconds on the wire, a local datetime string once received
    pub origin_publish_time: String,
    pub total_consumed_times: u32,
}

impl Provenance {
    /// Read provenance from a property set; `None` unless all four keys are present
    pub fn from_properties(properties: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            origin_id: properties.get(ORIGIN_ID_PROPERTY)?.clone(),
            chain_id: properties.get(CHAIN_ID_PROPERTY)?.clone(),
            origin_publish_time: properties.get(ORIGIN_PUBLISH_TIME_PROPERTY)?.clone(),
            total_consumed_times: properties
                .get(TOTAL_CONSUMED_TIMES_PROPERTY)?
                .trim()
                .parse()
                .ok()?,
        })
    }
}

impl MessageTranslator {
    /// Build the requeue request for `source`, delivered `delay` seconds from now
    pub fn to_retry_request(&self, source: &RawMessage, delay: i64) -> RelayResult<RawMessage> {
        self.to_retry_request_at(source, delay, now_millis())
    }

    /// Build the requeue request as of `now` (epoch milliseconds)
    pub fn to_retry_request_at(
        &self,
        source: &RawMessage,
        delay: i64,
        now: i64,
    ) -> RelayResult<RawMessage> {
        verify_delay_in_range(delay)?;

        let mut target = RawMessage::new(source.body.clone(), source.tag.clone());
        if let Some(key) = source.key.as_ref().filter(|k| !k.is_empty()) {
            target.key = Some(key.clone());
        }
        if let Some(sharding_key) = source.sharding_key.as_ref().filter(|k| !k.is_empty()) {
            target.sharding_key = Some(sharding_key.clone());
        }

        let rules = self.rules();
        inject(&rules.retry_injectors, source, &mut target.properties);

        // The body is still in the origin producer's wire encoding
        self.copy_properties(
            &source.properties,
            &mut target.properties,
            CopyPass {
                exempt: &[&rules.retry_injectors],
                mappers: &rules.retry_mappers,
                remainder: Remainder::Verbatim,
                skipped: crate::rules::RESERVED_PROPERTIES,
            },
        )?;

        target.start_deliver_time = Some(now + delay * 1000);
        Ok(target)
    }
}
