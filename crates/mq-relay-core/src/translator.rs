//! # Message Translator
//!
//! Converts broker messages into the application model on receive and
//! application messages into publish requests on send.
//!
//! Both directions share one property-copy routine. Injected keys are written
//! first and are never copied again from the source. Properties whose name
//! starts with the format or charset prefix travel unchanged, as do keys
//! registered with [`MessageTranslator::with_verbatim_key`]. Mapper rules win
//! over the generic codec, and whatever is left is passed through the codec
//! selected for its own key.
//!
//! Codec selection for a field resolves, in order: the `<prefix><Field>`
//! property on the message itself, the `<prefix><Field>` entry in the
//! configured overrides, the configured default, and finally hex / UTF-8.

use crate::codec::{self, Charset, WireFormat};
use crate::error::{ConfigurationError, RelayResult};
use crate::message::{Delay, Message, SHARDING_KEY_PROPERTY};
use crate::retry::verify_delay_in_range;
use crate::rules::{InjectorTable, KeyedRule, MapperTable, PropertyRules};
use mq_relay_runtime::{
    now_millis, RawMessage, KEYS_PROPERTY, SHARDING_KEY_PROPERTY as WIRE_SHARDING_KEY_PROPERTY,
    START_DELIVER_TIME_PROPERTY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "translator_tests.rs"]
mod tests;

/// Field name used to look up body codec overrides
pub const BODY_FIELD: &str = "Body";

pub const DEFAULT_FORMAT_PREFIX: &str = "Format:";
pub const DEFAULT_CHARSET_PREFIX: &str = "Charset:";

/// Keys never copied as free-form properties on publish
const PUBLISH_SKIPPED: &[&str] = &[
    KEYS_PROPERTY,
    WIRE_SHARDING_KEY_PROPERTY,
    START_DELIVER_TIME_PROPERTY,
    SHARDING_KEY_PROPERTY,
];

// ============================================================================
// Codec Settings
// ============================================================================

/// Codec selection rules shared by a producer or consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Prefix of per-field format override keys
    pub format_prefix: String,
    /// Prefix of per-field charset override keys
    pub charset_prefix: String,
    /// Default format name when no override applies
    pub format: Option<String>,
    /// Default charset name when no override applies
    pub charset: Option<String>,
    /// Per-field overrides keyed `<prefix><Field>`
    pub overrides: HashMap<String, String>,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            format_prefix: DEFAULT_FORMAT_PREFIX.to_string(),
            charset_prefix: DEFAULT_CHARSET_PREFIX.to_string(),
            format: None,
            charset: None,
            overrides: HashMap::new(),
        }
    }
}

impl CodecSettings {
    /// Check prefixes and every configured format name
    pub fn validate(&self) -> RelayResult<()> {
        if self.format_prefix.is_empty() || self.charset_prefix.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "format and charset prefixes must not be empty".to_string(),
            }
            .into());
        }
        if self.format_prefix == self.charset_prefix {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "format and charset prefixes must differ, both are '{}'",
                    self.format_prefix
                ),
            }
            .into());
        }

        WireFormat::resolve(self.format.as_deref())?;
        for (key, value) in &self.overrides {
            if key.starts_with(&self.format_prefix) {
                WireFormat::from_name(value)?;
            }
        }
        Ok(())
    }

    /// Check whether `key` names a format or charset override
    pub fn is_codec_key(&self, key: &str) -> bool {
        (!self.format_prefix.is_empty() && key.starts_with(&self.format_prefix))
            || (!self.charset_prefix.is_empty() && key.starts_with(&self.charset_prefix))
    }

    /// Resolve the codec for `field` given the message's own properties
    pub fn resolve(
        &self,
        field: &str,
        properties: &HashMap<String, String>,
    ) -> RelayResult<(WireFormat, Charset)> {
        let format_key = format!("{}{}", self.format_prefix, field);
        let charset_key = format!("{}{}", self.charset_prefix, field);

        let format = lookup(properties, &format_key)
            .or_else(|| lookup(&self.overrides, &format_key))
            .or(self.format.as_deref());
        let charset = lookup(properties, &charset_key)
            .or_else(|| lookup(&self.overrides, &charset_key))
            .or(self.charset.as_deref());

        Ok((WireFormat::resolve(format)?, Charset::resolve(charset)))
    }
}

/// Case-insensitive key lookup, ignoring empty values
fn lookup<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    map.get(key)
        .or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Property Copy
// ============================================================================

/// Treatment of properties no rule claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Remainder {
    Encode,
    Decode,
    Verbatim,
}

/// Parameters of one property-copy pass
pub(crate) struct CopyPass<'a> {
    /// Tables whose keys were already injected
    pub exempt: &'a [&'a InjectorTable],
    pub mappers: &'a MapperTable,
    pub remainder: Remainder,
    /// Keys dropped before any rule is consulted
    pub skipped: &'a [&'a str],
}

/// Insert computed values, keeping any value already present
pub(crate) fn inject(
    table: &InjectorTable,
    source: &RawMessage,
    target: &mut HashMap<String, String>,
) {
    for rule in table.iter() {
        if rule.key().is_empty() {
            continue;
        }
        if let Some(value) = rule.compute(source) {
            target.entry(rule.key().to_string()).or_insert(value);
        }
    }
}

// ============================================================================
// Message Translator
// ============================================================================

/// Converts messages between the broker and application representations
#[derive(Debug, Clone)]
pub struct MessageTranslator {
    rules: Arc<PropertyRules>,
    codec: CodecSettings,
    /// Keys copied unchanged in every direction
    verbatim: Vec<String>,
}

impl MessageTranslator {
    /// Create translator over shared rule tables
    pub fn new(rules: Arc<PropertyRules>, codec: CodecSettings) -> Self {
        Self {
            rules,
            codec,
            verbatim: Vec::new(),
        }
    }

    /// Carry `key` through every copy pass without codec transformation.
    ///
    /// Used for routing metadata compared as plain text, such as the group
    /// ownership claim.
    pub fn with_verbatim_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() && !self.is_verbatim_key(&key) {
            self.verbatim.push(key);
        }
        self
    }

    /// Check whether `key` is copied unchanged
    pub fn is_verbatim_key(&self, key: &str) -> bool {
        self.codec.is_codec_key(key) || self.verbatim.iter().any(|k| k == key)
    }

    /// Rule tables in use
    pub fn rules(&self) -> &PropertyRules {
        &self.rules
    }

    /// Codec settings in use
    pub fn codec(&self) -> &CodecSettings {
        &self.codec
    }

    /// Build the application message for a delivered broker message
    pub fn to_message(&self, source: &RawMessage) -> RelayResult<Message> {
        let (format, charset) = self.codec.resolve(BODY_FIELD, &source.properties)?;
        let body = source
            .body
            .as_deref()
            .map(|body| codec::decode_field(BODY_FIELD, body, format, charset))
            .transpose()?;

        let mut properties = HashMap::new();
        if let Some(sharding_key) = source.sharding_key.as_ref().filter(|k| !k.is_empty()) {
            properties.insert(SHARDING_KEY_PROPERTY.to_string(), sharding_key.clone());
        }

        inject(&self.rules.consume_sdk_injectors, source, &mut properties);
        inject(&self.rules.consume_injectors, source, &mut properties);

        self.copy_properties(
            &source.properties,
            &mut properties,
            CopyPass {
                exempt: &[
                    &self.rules.consume_sdk_injectors,
                    &self.rules.consume_injectors,
                ],
                mappers: &self.rules.consume_mappers,
                remainder: Remainder::Decode,
                skipped: &[],
            },
        )?;

        Ok(Message {
            id: source.id.clone(),
            body,
            tag: source.tag.clone(),
            key: source.key.clone(),
            delay: None,
            properties,
        })
    }

    /// Build the publish request for an application message
    pub fn to_publish_request(&self, source: &Message) -> RelayResult<RawMessage> {
        self.to_publish_request_at(source, now_millis())
    }

    /// Build the publish request as of `now` (epoch milliseconds)
    pub fn to_publish_request_at(&self, source: &Message, now: i64) -> RelayResult<RawMessage> {
        let start_deliver_time = match source.delay {
            None => None,
            Some(Delay::Offset(seconds)) => {
                verify_delay_in_range(seconds)?;
                Some(now + seconds * 1000)
            }
            Some(Delay::Deadline(deadline)) => {
                // The bound applies to what is left after subtracting now
                verify_delay_in_range(deadline.saturating_sub(now.div_euclid(1000)))?;
                Some(deadline.saturating_mul(1000))
            }
        };

        let (format, charset) = self.codec.resolve(BODY_FIELD, &source.properties)?;
        let body = source
            .body
            .as_deref()
            .map(|body| codec::encode(body, format, charset));

        let mut target = RawMessage::new(body, source.tag.clone());
        target.start_deliver_time = start_deliver_time;
        if let Some(key) = source.key.as_ref().filter(|k| !k.is_empty()) {
            target.key = Some(key.clone());
        }
        if let Some(sharding_key) = source.sharding_key() {
            target.sharding_key = Some(sharding_key.to_string());
        }

        self.copy_properties(
            &source.properties,
            &mut target.properties,
            CopyPass {
                exempt: &[],
                mappers: &self.rules.publish_mappers,
                remainder: Remainder::Encode,
                skipped: PUBLISH_SKIPPED,
            },
        )?;

        Ok(target)
    }

    /// Copy `source` properties into `target` following the precedence rules
    pub(crate) fn copy_properties(
        &self,
        source: &HashMap<String, String>,
        target: &mut HashMap<String, String>,
        pass: CopyPass<'_>,
    ) -> RelayResult<()> {
        for (key, value) in source {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if pass.exempt.iter().any(|table| table.contains(key)) {
                continue;
            }
            if pass.skipped.contains(&key.as_str()) {
                continue;
            }

            let copied = if self.is_verbatim_key(key) {
                Some(value.clone())
            } else if let Some(rule) = pass.mappers.get(key) {
                rule.apply(value)
            } else {
                match pass.remainder {
                    Remainder::Verbatim => Some(value.clone()),
                    Remainder::Encode => {
                        let (format, charset) = self.codec.resolve(key, source)?;
                        Some(codec::encode(value, format, charset))
                    }
                    Remainder::Decode => {
                        let (format, charset) = self.codec.resolve(key, source)?;
                        Some(codec::decode_field(key, value, format, charset)?)
                    }
                }
            };

            if let Some(copied) = copied.filter(|v| !v.is_empty()) {
                target.entry(key.clone()).or_insert(copied);
            }
        }
        Ok(())
    }
}

impl Default for MessageTranslator {
    fn default() -> Self {
        Self::new(Arc::new(PropertyRules::standard()), CodecSettings::default())
    }
}
