//! # Property Rule Tables
//!
//! Declarative tables describing how message properties are synthesized,
//! dropped or rewritten when a message crosses between the broker and the
//! application model.
//!
//! Three kinds of rule exist:
//! - **Injector** rules, keyed by the destination property, compute a value
//!   from the source [`RawMessage`]. An empty result omits the property.
//! - **Mapper** rules, keyed by the source property, rewrite an existing
//!   value. An empty result drops the property.
//! - **SDK-property injectors** are injectors that surface opaque delivery
//!   metadata as `__`-prefixed properties.
//!
//! Tables are ordered, unique by key, and frozen once built. A single
//! [`PropertyRules`] is shared by every translator through an `Arc`.

use chrono::{Local, TimeZone};
use mq_relay_runtime::{
    RawMessage, KEYS_PROPERTY, SHARDING_KEY_PROPERTY, START_DELIVER_TIME_PROPERTY,
};
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;

// ============================================================================
// Well-Known Property Names
// ============================================================================

/// Id of the first message in a redelivery chain.
///
/// The provenance names keep the spelling existing producers put on the wire.
pub const ORIGIN_ID_PROPERTY: &str = "_OrginId";
/// Id of the immediately preceding hop
pub const CHAIN_ID_PROPERTY: &str = "_ChainId";
/// Publish time of the first message in the chain
pub const ORIGIN_PUBLISH_TIME_PROPERTY: &str = "_OrginPublishTime";
/// Deliveries accumulated across the whole chain
pub const TOTAL_CONSUMED_TIMES_PROPERTY: &str = "_TotalConsumedTimes";

/// Marker prefix of SDK-surfaced delivery metadata
pub const SDK_PROPERTY_PREFIX: &str = "__";
pub const RECEIPT_HANDLE_PROPERTY: &str = "__ReceiptHandle";
pub const BODY_MD5_PROPERTY: &str = "__BodyMD5";
pub const CONSUMED_TIMES_PROPERTY: &str = "__ConsumedTimes";
pub const FIRST_CONSUME_TIME_PROPERTY: &str = "__FirstConsumeTime";
pub const NEXT_CONSUME_TIME_PROPERTY: &str = "__NextConsumeTime";
pub const PUBLISH_TIME_PROPERTY: &str = "__PublishTime";

/// Broker property recording the producing host
pub const BORN_HOST_PROPERTY: &str = "__BORNHOST";

/// Structural fields that travel in dedicated slots and are never copied as
/// free-form properties on the way out
pub const RESERVED_PROPERTIES: &[&str] = &[
    KEYS_PROPERTY,
    SHARDING_KEY_PROPERTY,
    START_DELIVER_TIME_PROPERTY,
];

/// Check whether `key` is a reserved structural property
pub fn is_reserved(key: &str) -> bool {
    RESERVED_PROPERTIES.contains(&key)
}

/// Render epoch milliseconds as local `yyyy-MM-dd HH:mm:ss.fff`
pub fn format_local_datetime(millis: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

// ============================================================================
// Rules
// ============================================================================

/// Computes a property value from the source message
pub type InjectFn = Arc<dyn Fn(&RawMessage) -> Option<String> + Send + Sync>;

/// Rewrites an existing property value
pub type MapFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Rule types stored in a [`RuleTable`]
pub trait KeyedRule {
    /// Property name the rule is keyed by
    fn key(&self) -> &str;
}

/// Synthesizes one destination property
#[derive(Clone)]
pub struct InjectorRule {
    key: String,
    compute: InjectFn,
}

impl InjectorRule {
    /// Create injector for `key`
    pub fn new<F>(key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&RawMessage) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            compute: Arc::new(compute),
        }
    }

    /// Compute the value; empty values count as absent
    pub fn compute(&self, source: &RawMessage) -> Option<String> {
        (self.compute)(source).filter(|v| !v.is_empty())
    }
}

impl KeyedRule for InjectorRule {
    fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for InjectorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorRule").field("key", &self.key).finish()
    }
}

/// Rewrites or drops one source property
#[derive(Clone)]
pub struct MapperRule {
    key: String,
    map: MapFn,
}

impl MapperRule {
    /// Create mapper for `key`
    pub fn new<F>(key: impl Into<String>, map: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            map: Arc::new(map),
        }
    }

    /// Mapper that always drops `key`
    pub fn discard(key: impl Into<String>) -> Self {
        Self::new(key, |_| None)
    }

    /// Mapper that keeps `key` verbatim, bypassing any codec
    pub fn keep(key: impl Into<String>) -> Self {
        Self::new(key, |value| Some(value.to_string()))
    }

    /// Apply the mapping; empty values count as dropped
    pub fn apply(&self, value: &str) -> Option<String> {
        (self.map)(value).filter(|v| !v.is_empty())
    }
}

impl KeyedRule for MapperRule {
    fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for MapperRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperRule").field("key", &self.key).finish()
    }
}

// ============================================================================
// Rule Table
// ============================================================================

/// Ordered rules with unique keys
#[derive(Debug, Clone)]
pub struct RuleTable<R> {
    rules: Vec<R>,
}

impl<R: KeyedRule> RuleTable<R> {
    /// Create empty table
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule, replacing any rule with the same key in place
    pub fn with(mut self, rule: R) -> Self {
        self.insert(rule);
        self
    }

    /// Add a rule, replacing any rule with the same key in place
    pub fn insert(&mut self, rule: R) {
        match self.rules.iter_mut().find(|r| r.key() == rule.key()) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    /// Remove the rule for `key`
    pub fn remove(&mut self, key: &str) -> Option<R> {
        let index = self.rules.iter().position(|r| r.key() == key)?;
        Some(self.rules.remove(index))
    }

    /// Rule keyed by `key`
    pub fn get(&self, key: &str) -> Option<&R> {
        self.rules.iter().find(|r| r.key() == key)
    }

    /// Check if a rule exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Rules in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<R: KeyedRule> Default for RuleTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Table of injector rules
pub type InjectorTable = RuleTable<InjectorRule>;

/// Table of mapper rules
pub type MapperTable = RuleTable<MapperRule>;

// ============================================================================
// Property Rules
// ============================================================================

/// Every rule table used by the translator
#[derive(Debug, Clone)]
pub struct PropertyRules {
    /// Applied to application properties on publish
    pub publish_mappers: MapperTable,
    /// Applied to broker properties when building a requeue
    pub retry_mappers: MapperTable,
    /// Applied to broker properties on receive
    pub consume_mappers: MapperTable,
    /// Provenance stamped on every requeue
    pub retry_injectors: InjectorTable,
    /// Delivery metadata surfaced on receive
    pub consume_sdk_injectors: InjectorTable,
    /// Provenance surfaced on receive
    pub consume_injectors: InjectorTable,
}

impl PropertyRules {
    /// Standard tables for HTTP topic brokers
    pub fn standard() -> Self {
        Self {
            publish_mappers: MapperTable::new()
                .with(MapperRule::discard(KEYS_PROPERTY))
                .with(MapperRule::discard(SHARDING_KEY_PROPERTY))
                .with(MapperRule::discard(START_DELIVER_TIME_PROPERTY)),
            retry_mappers: MapperTable::new()
                .with(MapperRule::discard(KEYS_PROPERTY))
                .with(MapperRule::discard(SHARDING_KEY_PROPERTY))
                .with(MapperRule::discard(START_DELIVER_TIME_PROPERTY))
                .with(MapperRule::discard(BORN_HOST_PROPERTY)),
            consume_mappers: MapperTable::new()
                .with(MapperRule::discard(KEYS_PROPERTY))
                .with(MapperRule::discard(SHARDING_KEY_PROPERTY))
                .with(MapperRule::keep(BORN_HOST_PROPERTY))
                .with(MapperRule::new(START_DELIVER_TIME_PROPERTY, |value| {
                    value.trim().parse().ok().and_then(format_local_datetime)
                })),
            retry_injectors: InjectorTable::new()
                .with(InjectorRule::new(ORIGIN_ID_PROPERTY, |m| {
                    existing(m, ORIGIN_ID_PROPERTY).or_else(|| own_id(m))
                }))
                .with(InjectorRule::new(CHAIN_ID_PROPERTY, own_id))
                .with(InjectorRule::new(ORIGIN_PUBLISH_TIME_PROPERTY, |m| {
                    existing(m, ORIGIN_PUBLISH_TIME_PROPERTY)
                        .or_else(|| m.publish_time.map(|t| t.to_string()))
                }))
                .with(InjectorRule::new(TOTAL_CONSUMED_TIMES_PROPERTY, |m| {
                    Some(total_consumed_times(m).saturating_add(1).to_string())
                })),
            consume_sdk_injectors: InjectorTable::new()
                .with(InjectorRule::new(RECEIPT_HANDLE_PROPERTY, |m| {
                    m.receipt_handle.as_ref().map(|h| h.as_str().to_string())
                }))
                .with(InjectorRule::new(BODY_MD5_PROPERTY, |m| m.body_md5.clone()))
                .with(InjectorRule::new(CONSUMED_TIMES_PROPERTY, |m| {
                    Some(m.consumed_times.to_string())
                }))
                .with(InjectorRule::new(FIRST_CONSUME_TIME_PROPERTY, |m| {
                    m.first_consume_time.and_then(format_local_datetime)
                }))
                .with(InjectorRule::new(NEXT_CONSUME_TIME_PROPERTY, |m| {
                    m.next_consume_time.and_then(format_local_datetime)
                }))
                .with(InjectorRule::new(PUBLISH_TIME_PROPERTY, |m| {
                    m.publish_time.and_then(format_local_datetime)
                })),
            consume_injectors: InjectorTable::new()
                .with(InjectorRule::new(ORIGIN_ID_PROPERTY, |m| {
                    existing(m, ORIGIN_ID_PROPERTY).or_else(|| own_id(m))
                }))
                .with(InjectorRule::new(CHAIN_ID_PROPERTY, |m| {
                    existing(m, CHAIN_ID_PROPERTY).or_else(|| own_id(m))
                }))
                .with(InjectorRule::new(ORIGIN_PUBLISH_TIME_PROPERTY, |m| {
                    m.property(ORIGIN_PUBLISH_TIME_PROPERTY)
                        .and_then(|v| v.trim().parse::<i64>().ok())
                        .or(m.publish_time)
                        .and_then(format_local_datetime)
                }))
                .with(InjectorRule::new(TOTAL_CONSUMED_TIMES_PROPERTY, |m| {
                    existing(m, TOTAL_CONSUMED_TIMES_PROPERTY)
                        .or_else(|| Some(m.consumed_times.to_string()))
                })),
        }
    }

    /// Builder seeded with the standard tables
    pub fn builder() -> PropertyRulesBuilder {
        PropertyRulesBuilder {
            rules: Self::standard(),
        }
    }
}

impl Default for PropertyRules {
    fn default() -> Self {
        Self::standard()
    }
}

fn existing(message: &RawMessage, key: &str) -> Option<String> {
    message
        .property(key)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn own_id(message: &RawMessage) -> Option<String> {
    message.id.as_ref().map(|id| id.as_str().to_string())
}

/// Chain-wide delivery count, seeded from the broker count on the first hop
fn total_consumed_times(message: &RawMessage) -> u32 {
    message
        .property(TOTAL_CONSUMED_TIMES_PROPERTY)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(message.consumed_times)
}

/// Adjusts the standard tables before they are frozen
pub struct PropertyRulesBuilder {
    rules: PropertyRules,
}

impl PropertyRulesBuilder {
    /// Builder with every table empty
    pub fn empty() -> Self {
        Self {
            rules: PropertyRules {
                publish_mappers: MapperTable::new(),
                retry_mappers: MapperTable::new(),
                consume_mappers: MapperTable::new(),
                retry_injectors: InjectorTable::new(),
                consume_sdk_injectors: InjectorTable::new(),
                consume_injectors: InjectorTable::new(),
            },
        }
    }

    pub fn publish_mapper(mut self, rule: MapperRule) -> Self {
        self.rules.publish_mappers.insert(rule);
        self
    }

    pub fn retry_mapper(mut self, rule: MapperRule) -> Self {
        self.rules.retry_mappers.insert(rule);
        self
    }

    pub fn consume_mapper(mut self, rule: MapperRule) -> Self {
        self.rules.consume_mappers.insert(rule);
        self
    }

    pub fn retry_injector(mut self, rule: InjectorRule) -> Self {
        self.rules.retry_injectors.insert(rule);
        self
    }

    pub fn consume_sdk_injector(mut self, rule: InjectorRule) -> Self {
        self.rules.consume_sdk_injectors.insert(rule);
        self
    }

    pub fn consume_injector(mut self, rule: InjectorRule) -> Self {
        self.rules.consume_injectors.insert(rule);
        self
    }

    /// Freeze the tables for sharing
    pub fn build(self) -> Arc<PropertyRules> {
        Arc::new(self.rules)
    }
}
