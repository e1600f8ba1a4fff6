//! Tests for configuration loading and validation.

use super::*;
use crate::error::RelayError;
use std::io::Write;
use tempfile::NamedTempFile;

const SAMPLE: &str = r#"
format: b64
charset: utf-8
overrides:
  "Format:city": raw
consumers:
  orders:
    instance: inst-1
    topic: orders
    group: groupA
    tag: t1
    batch: 8
    ownership_property: Owner
    charset: gbk
    overrides:
      "Format:Body": h16
producers:
  orders:
    instance: inst-1
    topic: orders
"#;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Environment source with fixed variables instead of the process environment
fn env(vars: &[(&str, &str)]) -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
}

// ============================================================================
// Default Tests
// ============================================================================

mod defaults {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = RelayConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.format_prefix, "Format:");
        assert_eq!(config.charset_prefix, "Charset:");
    }

    #[test]
    fn test_consumer_defaults() {
        let config = RelayConfig::from_yaml(
            "consumers:\n  jobs:\n    instance: i\n    topic: t\n    group: g\n",
        )
        .unwrap();
        let consumer = &config.consumers["jobs"];
        assert_eq!(consumer.batch, 1);
        assert_eq!(consumer.timeout(), Duration::from_secs(5));
        assert!(consumer.ownership_property.is_none());
        assert_eq!(consumer.codec, CodecOverrides::default());
    }
}

// ============================================================================
// Loading Tests
// ============================================================================

mod loading {
    use super::*;

    #[test]
    fn test_load_explicit_file() {
        let file = yaml_file(SAMPLE);
        let config = RelayConfig::load_with_env(Some(file.path()), env(&[])).unwrap();

        assert_eq!(config.format.as_deref(), Some("b64"));
        let consumer = &config.consumers["orders"];
        assert_eq!(consumer.batch, 8);
        assert_eq!(consumer.ownership_property.as_deref(), Some("Owner"));
        assert_eq!(consumer.codec.charset.as_deref(), Some("gbk"));
        assert_eq!(
            consumer.endpoint(),
            TopicEndpoint::new("inst-1", "orders")
                .with_group("groupA")
                .with_tag("t1")
        );
        assert!(config.producers.contains_key("orders"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = RelayConfig::load_with_env(
            Some(Path::new("/nonexistent/mq-relay/relay.yaml")),
            env(&[]),
        );
        assert!(matches!(
            result,
            Err(RelayError::Configuration(ConfigurationError::Parsing { .. }))
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml_file(SAMPLE);
        let config = RelayConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("MQ_RELAY__FORMAT", "hex"),
                ("MQ_RELAY__CONSUMERS__ORDERS__BATCH", "4"),
            ]),
        )
        .unwrap();

        assert_eq!(config.format.as_deref(), Some("hex"));
        assert_eq!(config.consumers["orders"].batch, 4);
    }

    #[test]
    fn test_malformed_yaml_is_a_parsing_error() {
        let file = yaml_file("consumers: [unterminated");
        let result = RelayConfig::load_with_env(Some(file.path()), env(&[]));
        assert!(matches!(
            result,
            Err(RelayError::Configuration(ConfigurationError::Parsing { .. }))
        ));
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_unknown_default_format_fails() {
        let result = RelayConfig::from_yaml("format: rot13");
        assert!(matches!(result, Err(RelayError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_unknown_override_format_fails() {
        let result = RelayConfig::from_yaml("overrides:\n  \"Format:Body\": rot13\n");
        assert!(matches!(result, Err(RelayError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_unknown_consumer_format_fails() {
        let mut config = RelayConfig::default();
        let mut consumer = ConsumerSettings::new("i", "t", "g");
        consumer.codec.format = Some("rot13".to_string());
        config.consumers.insert("jobs".to_string(), consumer);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_fails() {
        let mut config = RelayConfig::default();
        let mut consumer = ConsumerSettings::new("i", "t", "g");
        consumer.batch = 0;
        config.consumers.insert("jobs".to_string(), consumer);

        match config.validate() {
            Err(RelayError::Configuration(ConfigurationError::Invalid { message })) => {
                assert!(message.contains("consumers.jobs.batch"));
            }
            other => panic!("Expected invalid batch, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_or_empty_prefixes_fail() {
        let config = RelayConfig {
            charset_prefix: "Format:".to_string(),
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            format_prefix: String::new(),
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_identity_fields_fail() {
        let mut config = RelayConfig::default();
        config
            .producers
            .insert("events".to_string(), ProducerSettings::new("i", ""));

        match config.validate() {
            Err(RelayError::Configuration(ConfigurationError::Missing { key })) => {
                assert_eq!(key, "producers.events.topic");
            }
            other => panic!("Expected missing topic, got {:?}", other),
        }
    }
}

// ============================================================================
// Codec Merge Tests
// ============================================================================

mod codec_merge {
    use super::*;

    #[test]
    fn test_local_values_override_top_level() {
        let config = RelayConfig::from_yaml(SAMPLE).unwrap();
        let merged = config.codec_for(&config.consumers["orders"].codec);

        assert_eq!(merged.format.as_deref(), Some("b64"));
        assert_eq!(merged.charset.as_deref(), Some("gbk"));
        assert_eq!(merged.format_prefix, "Format:");
        assert_eq!(merged.overrides.len(), 2);
    }

    #[test]
    fn test_producer_without_overrides_uses_top_level() {
        let config = RelayConfig::from_yaml(SAMPLE).unwrap();
        let merged = config.codec_for(&config.producers["orders"].codec);
        assert_eq!(merged, config.codec());
    }
}
