//! Tests for the payload codec.

use super::*;

const SAMPLES: &[&str] = &["", "hello world", "订单已创建 ✓"];

// ============================================================================
// Format Lookup Tests
// ============================================================================

mod format_lookup {
    use super::*;

    #[test]
    fn test_synonyms_resolve_to_same_format() {
        assert_eq!(WireFormat::from_name("b64").unwrap(), WireFormat::Base64);
        assert_eq!(WireFormat::from_name("base64").unwrap(), WireFormat::Base64);
        assert_eq!(WireFormat::from_name("h16").unwrap(), WireFormat::Hex);
        assert_eq!(WireFormat::from_name("hex").unwrap(), WireFormat::Hex);
        assert_eq!(WireFormat::from_name("raw").unwrap(), WireFormat::Raw);
        assert_eq!(WireFormat::from_name("none").unwrap(), WireFormat::Raw);
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(WireFormat::from_name("B64").unwrap(), WireFormat::Base64);
        assert_eq!(WireFormat::from_name("Base64").unwrap(), WireFormat::Base64);
        assert_eq!(WireFormat::from_name("HEX").unwrap(), WireFormat::Hex);
        assert_eq!(WireFormat::from_name("NoNe").unwrap(), WireFormat::Raw);
    }

    #[test]
    fn test_unknown_format_lists_supported_names() {
        let error = WireFormat::from_name("rot13").unwrap_err();
        match error {
            RelayError::UnsupportedFormat { name, supported } => {
                assert_eq!(name, "rot13");
                assert_eq!(supported, "RAW:raw,none;Base64:b64,base64;Hex:h16,hex");
            }
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_format_defaults_to_hex() {
        assert_eq!(WireFormat::resolve(None).unwrap(), WireFormat::Hex);
        assert_eq!(WireFormat::resolve(Some("")).unwrap(), WireFormat::Hex);
        assert_eq!(WireFormat::resolve(Some("b64")).unwrap(), WireFormat::Base64);
        assert!(WireFormat::resolve(Some("zip")).is_err());
    }

    #[test]
    fn test_from_str_matches_from_name() {
        let parsed: WireFormat = "BASE64".parse().unwrap();
        assert_eq!(parsed, WireFormat::Base64);
    }
}

// ============================================================================
// Charset Tests
// ============================================================================

mod charset {
    use super::*;

    #[test]
    fn test_charset_lookup_ignores_case() {
        assert_eq!(Charset::lookup("UTF-8").unwrap().name(), "UTF-8");
        assert_eq!(Charset::lookup("gbk").unwrap().name(), "GBK");
        assert_eq!(Charset::lookup("Shift_JIS").unwrap().name(), "Shift_JIS");
    }

    #[test]
    fn test_unresolvable_charset_falls_back_to_utf8() {
        assert_eq!(Charset::resolve(None), Charset::utf8());
        assert_eq!(Charset::resolve(Some("")), Charset::utf8());
        assert_eq!(Charset::resolve(Some("klingon-8")), Charset::utf8());
    }
}

// ============================================================================
// Round Trip Tests
// ============================================================================

mod round_trip {
    use super::*;

    fn assert_round_trip(format: WireFormat, charset: Charset) {
        for sample in SAMPLES {
            let wire = encode(sample, format, charset);
            let text = decode(&wire, format, charset).unwrap();
            assert_eq!(&text, sample, "format={} charset={}", format, charset);
        }
    }

    #[test]
    fn test_round_trip_under_utf8() {
        for format in [WireFormat::Raw, WireFormat::Base64, WireFormat::Hex] {
            assert_round_trip(format, Charset::utf8());
        }
    }

    #[test]
    fn test_round_trip_under_gbk() {
        let gbk = Charset::lookup("gbk").unwrap();
        // The check mark has no GBK mapping; stick to text GBK can carry
        for sample in ["", "hello world", "订单已创建"] {
            for format in [WireFormat::Raw, WireFormat::Base64, WireFormat::Hex] {
                let wire = encode(sample, format, gbk);
                assert_eq!(decode(&wire, format, gbk).unwrap(), sample);
            }
        }
    }

    #[test]
    fn test_round_trip_under_utf16() {
        assert_round_trip(WireFormat::Hex, Charset::lookup("utf-16le").unwrap());
        assert_round_trip(WireFormat::Base64, Charset::lookup("utf-16be").unwrap());
    }
}

// ============================================================================
// Encoding Detail Tests
// ============================================================================

mod encoding_detail {
    use super::*;

    #[test]
    fn test_hex_is_uppercase_utf8_bytes() {
        assert_eq!(encode("hello", WireFormat::Hex, Charset::utf8()), "68656C6C6F");
    }

    #[test]
    fn test_hex_decode_accepts_lowercase() {
        assert_eq!(
            decode("68656c6c6f", WireFormat::Hex, Charset::utf8()).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_charset_changes_bytes() {
        let gbk = Charset::lookup("gbk").unwrap();
        assert_eq!(encode("中", WireFormat::Hex, Charset::utf8()), "E4B8AD");
        assert_eq!(encode("中", WireFormat::Hex, gbk), "D6D0");
    }

    #[test]
    fn test_base64_uses_standard_alphabet() {
        assert_eq!(encode("hello", WireFormat::Base64, Charset::utf8()), "aGVsbG8=");
    }

    #[test]
    fn test_raw_ignores_charset() {
        let gbk = Charset::lookup("gbk").unwrap();
        assert_eq!(encode("中", WireFormat::Raw, gbk), "中");
        assert_eq!(decode("中", WireFormat::Raw, gbk).unwrap(), "中");
    }

    #[test]
    fn test_invalid_hex_reports_payload_error() {
        let error = decode("XYZ", WireFormat::Hex, Charset::utf8()).unwrap_err();
        assert!(matches!(
            error,
            RelayError::InvalidPayload { ref format, .. } if format == "h16"
        ));
    }

    #[test]
    fn test_invalid_base64_reports_payload_error() {
        let error = decode("!!!", WireFormat::Base64, Charset::utf8()).unwrap_err();
        assert!(matches!(error, RelayError::InvalidPayload { .. }));
    }
}

// ============================================================================
// Named Codec Tests
// ============================================================================

mod named {
    use super::*;

    #[test]
    fn test_absent_input_short_circuits() {
        assert_eq!(encode_named(None, Some("hex"), None).unwrap(), None);
        assert_eq!(decode_named(None, Some("b64"), Some("gbk")).unwrap(), None);
        // Even an unknown format is not consulted for absent input
        assert_eq!(encode_named(None, Some("rot13"), None).unwrap(), None);
    }

    #[test]
    fn test_named_defaults_are_hex_and_utf8() {
        assert_eq!(
            encode_named(Some("hello"), None, None).unwrap().as_deref(),
            Some("68656C6C6F")
        );
        assert_eq!(
            decode_named(Some("68656C6C6F"), None, None).unwrap().as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_named_unknown_format_fails() {
        assert!(matches!(
            encode_named(Some("hello"), Some("rot13"), None),
            Err(RelayError::UnsupportedFormat { .. })
        ));
    }
}
