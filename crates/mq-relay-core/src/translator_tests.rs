//! Tests for the message translator.

use super::*;
use crate::error::RelayError;
use crate::rules::{
    BORN_HOST_PROPERTY, CHAIN_ID_PROPERTY, CONSUMED_TIMES_PROPERTY, ORIGIN_ID_PROPERTY,
    RECEIPT_HANDLE_PROPERTY, TOTAL_CONSUMED_TIMES_PROPERTY,
};
use mq_relay_runtime::{MessageId, ReceiptHandle};

const NOW: i64 = 1_700_000_000_500;

fn with_overrides(pairs: &[(&str, &str)]) -> MessageTranslator {
    let codec = CodecSettings {
        overrides: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..CodecSettings::default()
    };
    MessageTranslator::new(Arc::new(PropertyRules::standard()), codec)
}

fn delivered(body: &str) -> RawMessage {
    RawMessage::new(Some(body.to_string()), Some("t1".to_string()))
        .with_id(MessageId::new("MSG-1"))
        .with_receipt_handle(ReceiptHandle::new("rh-1"))
        .with_consumed_times(2)
        .with_publish_time(1_700_000_000_000)
}

// ============================================================================
// Codec Settings Tests
// ============================================================================

mod codec_settings {
    use super::*;

    #[test]
    fn test_defaults_to_hex_utf8() {
        let settings = CodecSettings::default();
        let (format, charset) = settings.resolve("Body", &HashMap::new()).unwrap();
        assert_eq!(format, WireFormat::Hex);
        assert_eq!(charset.name(), "UTF-8");
    }

    #[test]
    fn test_message_property_beats_override_beats_default() {
        let settings = CodecSettings {
            format: Some("raw".to_string()),
            overrides: [("Format:Body".to_string(), "h16".to_string())]
                .into_iter()
                .collect(),
            ..CodecSettings::default()
        };

        let empty = HashMap::new();
        assert_eq!(settings.resolve("Body", &empty).unwrap().0, WireFormat::Hex);
        assert_eq!(settings.resolve("city", &empty).unwrap().0, WireFormat::Raw);

        let own: HashMap<String, String> = [("Format:Body".to_string(), "b64".to_string())]
            .into_iter()
            .collect();
        assert_eq!(settings.resolve("Body", &own).unwrap().0, WireFormat::Base64);
    }

    #[test]
    fn test_override_keys_match_case_insensitively() {
        let properties: HashMap<String, String> = [
            ("format:body".to_string(), "B64".to_string()),
            ("CHARSET:BODY".to_string(), "gbk".to_string()),
        ]
        .into_iter()
        .collect();

        let (format, charset) = CodecSettings::default()
            .resolve("Body", &properties)
            .unwrap();
        assert_eq!(format, WireFormat::Base64);
        assert_eq!(charset.name(), "GBK");
    }

    #[test]
    fn test_empty_override_value_falls_through() {
        let properties: HashMap<String, String> = [("Format:Body".to_string(), String::new())]
            .into_iter()
            .collect();
        let (format, _) = CodecSettings::default()
            .resolve("Body", &properties)
            .unwrap();
        assert_eq!(format, WireFormat::Hex);
    }

    #[test]
    fn test_unknown_format_in_property_is_rejected() {
        let properties: HashMap<String, String> = [("Format:Body".to_string(), "rot13".to_string())]
            .into_iter()
            .collect();
        let result = CodecSettings::default().resolve("Body", &properties);
        assert!(matches!(result, Err(RelayError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_validate() {
        assert!(CodecSettings::default().validate().is_ok());

        let empty_prefix = CodecSettings {
            format_prefix: String::new(),
            ..CodecSettings::default()
        };
        assert!(matches!(
            empty_prefix.validate(),
            Err(RelayError::Configuration(_))
        ));

        let same_prefix = CodecSettings {
            charset_prefix: DEFAULT_FORMAT_PREFIX.to_string(),
            ..CodecSettings::default()
        };
        assert!(matches!(
            same_prefix.validate(),
            Err(RelayError::Configuration(_))
        ));

        let bad_default = CodecSettings {
            format: Some("rot13".to_string()),
            ..CodecSettings::default()
        };
        assert!(matches!(
            bad_default.validate(),
            Err(RelayError::UnsupportedFormat { .. })
        ));

        let bad_override = CodecSettings {
            overrides: [("Format:city".to_string(), "rot13".to_string())]
                .into_iter()
                .collect(),
            ..CodecSettings::default()
        };
        assert!(bad_override.validate().is_err());
    }
}

// ============================================================================
// Inbound Translation Tests
// ============================================================================

mod inbound {
    use super::*;

    #[test]
    fn test_decodes_body_and_free_form_properties() {
        let translator = MessageTranslator::default();
        let source = delivered("68656C6C6F")
            .with_key("order-42")
            .with_property("city", "E4B8AD");

        let message = translator.to_message(&source).unwrap();

        assert_eq!(message.id, Some(MessageId::new("MSG-1")));
        assert_eq!(message.body.as_deref(), Some("hello"));
        assert_eq!(message.tag.as_deref(), Some("t1"));
        assert_eq!(message.key.as_deref(), Some("order-42"));
        assert_eq!(message.property("city"), Some("中"));
        assert!(message.delay.is_none());
    }

    #[test]
    fn test_surfaces_delivery_metadata_and_provenance() {
        let translator = MessageTranslator::default();
        let message = translator.to_message(&delivered("")).unwrap();

        assert_eq!(message.property(RECEIPT_HANDLE_PROPERTY), Some("rh-1"));
        assert_eq!(message.property(CONSUMED_TIMES_PROPERTY), Some("2"));
        assert_eq!(message.property(ORIGIN_ID_PROPERTY), Some("MSG-1"));
        assert_eq!(message.property(CHAIN_ID_PROPERTY), Some("MSG-1"));
        assert_eq!(message.property(TOTAL_CONSUMED_TIMES_PROPERTY), Some("2"));
    }

    #[test]
    fn test_injected_values_cannot_be_forged_by_properties() {
        let translator = MessageTranslator::default();
        let source = delivered("").with_property(RECEIPT_HANDLE_PROPERTY, "forged");

        let message = translator.to_message(&source).unwrap();
        assert_eq!(message.property(RECEIPT_HANDLE_PROPERTY), Some("rh-1"));
    }

    #[test]
    fn test_structural_properties_are_dropped_and_born_host_kept() {
        let translator = MessageTranslator::default();
        let source = delivered("")
            .with_property(mq_relay_runtime::KEYS_PROPERTY, "order-42")
            .with_property(BORN_HOST_PROPERTY, "10.0.0.1");

        let message = translator.to_message(&source).unwrap();
        assert_eq!(message.property(mq_relay_runtime::KEYS_PROPERTY), None);
        assert_eq!(message.property(BORN_HOST_PROPERTY), Some("10.0.0.1"));
    }

    #[test]
    fn test_sharding_key_surfaces_as_property() {
        let translator = MessageTranslator::default();
        let source = delivered("").with_sharding_key("shard-7");

        let message = translator.to_message(&source).unwrap();
        assert_eq!(message.sharding_key(), Some("shard-7"));
    }

    #[test]
    fn test_codec_properties_on_message_select_decoding() {
        let translator = MessageTranslator::default();
        let source = delivered("aGVsbG8=")
            .with_property("Format:Body", "b64")
            .with_property("Format:city", "raw")
            .with_property("city", "中");

        let message = translator.to_message(&source).unwrap();
        assert_eq!(message.body.as_deref(), Some("hello"));
        assert_eq!(message.property("city"), Some("中"));
        // Codec keys travel unchanged
        assert_eq!(message.property("Format:Body"), Some("b64"));
        assert_eq!(message.property("Format:city"), Some("raw"));
    }

    #[test]
    fn test_configured_override_selects_decoding() {
        let translator = with_overrides(&[("Format:Body", "b64")]);
        let message = translator.to_message(&delivered("aGVsbG8=")).unwrap();
        assert_eq!(message.body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_malformed_body_names_the_field() {
        let translator = MessageTranslator::default();
        let result = translator.to_message(&delivered("not hex"));
        match result {
            Err(RelayError::InvalidPayload { field, .. }) => assert_eq!(field, BODY_FIELD),
            other => panic!("Expected InvalidPayload, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_property_names_the_key() {
        let translator = MessageTranslator::default();
        let result = translator.to_message(&delivered("").with_property("city", "XYZ"));
        match result {
            Err(RelayError::InvalidPayload { field, .. }) => assert_eq!(field, "city"),
            other => panic!("Expected InvalidPayload, got {:?}", other),
        }
    }
}

// ============================================================================
// Publish Translation Tests
// ============================================================================

mod publish {
    use super::*;

    #[test]
    fn test_hex_encodes_body_by_default() {
        let translator = MessageTranslator::default();
        let request = translator
            .to_publish_request_at(&Message::new("hello").with_tag("t1"), NOW)
            .unwrap();

        assert_eq!(request.body.as_deref(), Some("68656C6C6F"));
        assert_eq!(request.tag.as_deref(), Some("t1"));
        assert!(request.start_deliver_time.is_none());
        assert!(request.properties.is_empty());
    }

    #[test]
    fn test_structural_fields_travel_in_dedicated_slots() {
        let translator = MessageTranslator::default();
        let message = Message::new("hello")
            .with_key("order-42")
            .with_sharding_key("shard-7")
            .with_property(mq_relay_runtime::KEYS_PROPERTY, "other")
            .with_property(mq_relay_runtime::SHARDING_KEY_PROPERTY, "other")
            .with_property(mq_relay_runtime::START_DELIVER_TIME_PROPERTY, "0");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();

        assert_eq!(request.key.as_deref(), Some("order-42"));
        assert_eq!(request.sharding_key.as_deref(), Some("shard-7"));
        assert!(request.properties.is_empty());
    }

    #[test]
    fn test_properties_encode_with_their_own_codec() {
        let translator = MessageTranslator::default();
        let message = Message::new("hello")
            .with_property("city", "中")
            .with_property("region", "中")
            .with_property("Charset:region", "gbk")
            .with_property("note", "中")
            .with_property("Format:note", "raw");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();

        assert_eq!(request.property("city"), Some("E4B8AD"));
        assert_eq!(request.property("region"), Some("D6D0"));
        assert_eq!(request.property("note"), Some("中"));
        assert_eq!(request.property("Charset:region"), Some("gbk"));
        assert_eq!(request.property("Format:note"), Some("raw"));
    }

    #[test]
    fn test_publish_mapper_output_bypasses_codec() {
        let rules = PropertyRules::builder()
            .publish_mapper(crate::rules::MapperRule::keep("trace"))
            .publish_mapper(crate::rules::MapperRule::discard("secret"))
            .build();
        let translator = MessageTranslator::new(rules, CodecSettings::default());
        let message = Message::new("")
            .with_property("trace", "abc")
            .with_property("secret", "s3cr3t");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();
        assert_eq!(request.property("trace"), Some("abc"));
        assert_eq!(request.property("secret"), None);
    }

    #[test]
    fn test_empty_properties_are_skipped() {
        let translator = MessageTranslator::default();
        let message = Message::new("hello").with_property("blank", "");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();
        assert!(request.property("blank").is_none());
    }

    #[test]
    fn test_delay_offset_schedules_relative_to_now() {
        let translator = MessageTranslator::default();
        let request = translator
            .to_publish_request_at(&Message::new("x").with_delay_seconds(60), NOW)
            .unwrap();
        assert_eq!(request.start_deliver_time, Some(NOW + 60_000));
    }

    #[test]
    fn test_delay_deadline_schedules_absolute_time() {
        let translator = MessageTranslator::default();
        let deadline = NOW / 1000 + 120;
        let request = translator
            .to_publish_request_at(&Message::new("x").with_deliver_at(deadline), NOW)
            .unwrap();
        assert_eq!(request.start_deliver_time, Some(deadline * 1000));
    }

    #[test]
    fn test_out_of_range_delays_are_rejected() {
        let translator = MessageTranslator::default();
        let now_secs = NOW / 1000;

        for message in [
            Message::new("x").with_delay_seconds(0),
            Message::new("x").with_delay_seconds(259_201),
            Message::new("x").with_deliver_at(now_secs),
            Message::new("x").with_deliver_at(now_secs - 10),
            Message::new("x").with_deliver_at(now_secs + 259_201),
            Message::new("x").with_deliver_at(i64::MIN),
            Message::new("x").with_deliver_at(i64::MAX),
        ] {
            let result = translator.to_publish_request_at(&message, NOW);
            assert!(
                matches!(result, Err(RelayError::DeliveryDelayOutOfRange { .. })),
                "delay {:?} should be rejected",
                message.delay
            );
        }
    }

    #[test]
    fn test_verbatim_keys_skip_the_codec() {
        let translator = MessageTranslator::default().with_verbatim_key("Owner");
        let message = Message::new("x")
            .with_property("Owner", "*")
            .with_property("Region", "eu");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();
        assert_eq!(request.property("Owner"), Some("*"));
        assert_eq!(request.property("Region"), Some("6575"));

        let received = translator.to_message(&request).unwrap();
        assert_eq!(received.property("Owner"), Some("*"));
        assert_eq!(received.property("Region"), Some("eu"));
    }

    #[test]
    fn test_round_trip_through_inbound_translation() {
        let translator = with_overrides(&[("Format:Body", "b64"), ("Charset:Body", "gbk")]);
        let message = Message::new("订单已创建").with_property("city", "中");

        let request = translator.to_publish_request_at(&message, NOW).unwrap();
        let delivered = RawMessage {
            id: Some(MessageId::new("MSG-9")),
            ..request
        };
        let received = translator.to_message(&delivered).unwrap();

        assert_eq!(received.body.as_deref(), Some("订单已创建"));
        assert_eq!(received.property("city"), Some("中"));
    }
}
