//! # Relay Configuration
//!
//! Named producer and consumer definitions plus the codec defaults they share.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//! 1. `/etc/mq-relay/relay.yaml` (optional)
//! 2. `./config/relay.yaml` (optional)
//! 3. An explicit file path (required when given)
//! 4. Environment variables prefixed `MQ_RELAY__` with `__` as the separator,
//!    e.g. `MQ_RELAY__CONSUMERS__ORDERS__BATCH=4`
//!
//! Every field carries a serde default, so an unconfigured environment yields
//! a valid (empty) configuration.

use crate::codec::WireFormat;
use crate::consumer::{DEFAULT_BATCH, DEFAULT_TIMEOUT};
use crate::error::{ConfigurationError, RelayResult};
use crate::translator::{CodecSettings, DEFAULT_CHARSET_PREFIX, DEFAULT_FORMAT_PREFIX};
use mq_relay_runtime::TopicEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

pub const SYSTEM_CONFIG_FILE: &str = "/etc/mq-relay/relay";
pub const LOCAL_CONFIG_FILE: &str = "config/relay";
pub const ENV_PREFIX: &str = "MQ_RELAY";
pub const ENV_SEPARATOR: &str = "__";

// ============================================================================
// Settings Types
// ============================================================================

/// Top-level adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub format_prefix: String,
    pub charset_prefix: String,
    /// Default wire format name
    pub format: Option<String>,
    /// Default charset name
    pub charset: Option<String>,
    /// Per-field overrides keyed `<prefix><Field>`
    pub overrides: HashMap<String, String>,
    pub consumers: BTreeMap<String, ConsumerSettings>,
    pub producers: BTreeMap<String, ProducerSettings>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            format_prefix: DEFAULT_FORMAT_PREFIX.to_string(),
            charset_prefix: DEFAULT_CHARSET_PREFIX.to_string(),
            format: None,
            charset: None,
            overrides: HashMap::new(),
            consumers: BTreeMap::new(),
            producers: BTreeMap::new(),
        }
    }
}

/// Codec settings a single consumer or producer may override
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, String>,
}

/// One named consumer subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSettings {
    pub instance: String,
    pub topic: String,
    /// Consumer group, also the identity checked by the ownership filter
    pub group: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Maximum messages per fetch
    #[serde(default = "default_batch")]
    pub batch: u32,
    /// Fetch wait in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// Property naming the group that owns a message; filter off when unset
    #[serde(default)]
    pub ownership_property: Option<String>,
    #[serde(flatten)]
    pub codec: CodecOverrides,
}

impl ConsumerSettings {
    pub fn new(
        instance: impl Into<String>,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            topic: topic.into(),
            group: group.into(),
            tag: None,
            batch: DEFAULT_BATCH,
            timeout: default_timeout_secs(),
            ownership_property: None,
            codec: CodecOverrides::default(),
        }
    }

    /// Subscription endpoint
    pub fn endpoint(&self) -> TopicEndpoint {
        let endpoint = TopicEndpoint::new(&self.instance, &self.topic).with_group(&self.group);
        match self.tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => endpoint.with_tag(tag),
            None => endpoint,
        }
    }

    /// Endpoint the requeue producer publishes to
    pub fn requeue_endpoint(&self) -> TopicEndpoint {
        TopicEndpoint::new(&self.instance, &self.topic)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// One named producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSettings {
    pub instance: String,
    pub topic: String,
    /// Property carrying a group ownership claim, published as plain text
    #[serde(default)]
    pub ownership_property: Option<String>,
    #[serde(flatten)]
    pub codec: CodecOverrides,
}

impl ProducerSettings {
    pub fn new(instance: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            topic: topic.into(),
            ownership_property: None,
            codec: CodecOverrides::default(),
        }
    }

    pub fn endpoint(&self) -> TopicEndpoint {
        TopicEndpoint::new(&self.instance, &self.topic)
    }
}

fn default_batch() -> u32 {
    DEFAULT_BATCH
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl RelayConfig {
    /// Load from the standard sources, with an optional explicit file
    pub fn load(path: Option<&Path>) -> RelayResult<Self> {
        Self::load_with_env(
            path,
            config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
        )
    }

    /// Load with a caller-supplied environment source
    pub fn load_with_env(path: Option<&Path>, env: config::Environment) -> RelayResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name(SYSTEM_CONFIG_FILE)
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name(LOCAL_CONFIG_FILE)
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(
                config::File::from(path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }

        let loaded: Self = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a YAML document without consulting files or the environment
    pub fn from_yaml(yaml: &str) -> RelayResult<Self> {
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check codec names, prefixes and batch sizes
    pub fn validate(&self) -> RelayResult<()> {
        self.codec().validate()?;

        for (name, consumer) in &self.consumers {
            require(&consumer.instance, &format!("consumers.{name}.instance"))?;
            require(&consumer.topic, &format!("consumers.{name}.topic"))?;
            require(&consumer.group, &format!("consumers.{name}.group"))?;
            if consumer.batch == 0 {
                return Err(ConfigurationError::Invalid {
                    message: format!("consumers.{name}.batch must be at least 1"),
                }
                .into());
            }
            self.codec_for(&consumer.codec).validate()?;
            validate_override_formats(&self.codec_for(&consumer.codec))?;
        }

        for (name, producer) in &self.producers {
            require(&producer.instance, &format!("producers.{name}.instance"))?;
            require(&producer.topic, &format!("producers.{name}.topic"))?;
            self.codec_for(&producer.codec).validate()?;
            validate_override_formats(&self.codec_for(&producer.codec))?;
        }

        validate_override_formats(&self.codec())
    }

    /// Top-level codec settings
    pub fn codec(&self) -> CodecSettings {
        CodecSettings {
            format_prefix: self.format_prefix.clone(),
            charset_prefix: self.charset_prefix.clone(),
            format: self.format.clone(),
            charset: self.charset.clone(),
            overrides: self.overrides.clone(),
        }
    }

    /// Codec settings with `local` layered over the top-level values
    pub fn codec_for(&self, local: &CodecOverrides) -> CodecSettings {
        let mut overrides = self.overrides.clone();
        overrides.extend(local.overrides.clone());
        CodecSettings {
            format_prefix: local
                .format_prefix
                .clone()
                .unwrap_or_else(|| self.format_prefix.clone()),
            charset_prefix: local
                .charset_prefix
                .clone()
                .unwrap_or_else(|| self.charset_prefix.clone()),
            format: local.format.clone().or_else(|| self.format.clone()),
            charset: local.charset.clone().or_else(|| self.charset.clone()),
            overrides,
        }
    }
}

fn require(value: &str, key: &str) -> RelayResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::Missing {
            key: key.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Check every format override, matching the prefix case-insensitively since
/// some sources fold key case
fn validate_override_formats(codec: &CodecSettings) -> RelayResult<()> {
    let prefix = codec.format_prefix.to_ascii_lowercase();
    for (key, value) in &codec.overrides {
        if key.to_ascii_lowercase().starts_with(&prefix) {
            WireFormat::from_name(value)?;
        }
    }
    Ok(())
}
