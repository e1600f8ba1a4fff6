//! # Payload Codec
//!
//! Converts text to and from the string-typed wire representation used for
//! message bodies and property values.
//!
//! Encoding runs `text -> bytes (charset) -> wire string (format)` and decoding
//! runs the reverse. The `raw` format is the identity and never touches the
//! charset. Absent input stays absent at every stage.
//!
//! ```rust
//! use mq_relay_core::codec::{self, Charset, WireFormat};
//!
//! let wire = codec::encode("hello", WireFormat::Hex, Charset::utf8());
//! assert_eq!(wire, "68656C6C6F");
//! ```

use crate::error::{RelayError, RelayResult};
use base64::{engine::general_purpose, Engine as _};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

const RAW_NAMES: &[&str] = &["raw", "none"];
const BASE64_NAMES: &[&str] = &["b64", "base64"];
const HEX_NAMES: &[&str] = &["h16", "hex"];

// ============================================================================
// Wire Format
// ============================================================================

/// Textual encoding of bytes within a string-typed message field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// Identity, the text is carried as-is
    Raw,
    Base64,
    /// Uppercase hexadecimal
    #[default]
    Hex,
}

impl WireFormat {
    /// Look up a format by any of its names, ignoring case
    pub fn from_name(name: &str) -> RelayResult<Self> {
        let matches = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(name));

        if matches(RAW_NAMES) {
            Ok(Self::Raw)
        } else if matches(BASE64_NAMES) {
            Ok(Self::Base64)
        } else if matches(HEX_NAMES) {
            Ok(Self::Hex)
        } else {
            Err(RelayError::UnsupportedFormat {
                name: name.to_string(),
                supported: Self::supported_formats(),
            })
        }
    }

    /// Resolve an optional name; absent or empty names select [`WireFormat::Hex`]
    pub fn resolve(name: Option<&str>) -> RelayResult<Self> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Self::from_name(name),
            None => Ok(Self::default()),
        }
    }

    /// Listing of every accepted name, grouped by format
    pub fn supported_formats() -> String {
        format!(
            "RAW:{};Base64:{};Hex:{}",
            RAW_NAMES.join(","),
            BASE64_NAMES.join(","),
            HEX_NAMES.join(",")
        )
    }

    /// Canonical short name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Base64 => "b64",
            Self::Hex => "h16",
        }
    }

    fn bytes_to_wire(&self, bytes: &[u8]) -> String {
        match self {
            Self::Raw => String::from_utf8_lossy(bytes).into_owned(),
            Self::Base64 => general_purpose::STANDARD.encode(bytes),
            Self::Hex => hex::encode_upper(bytes),
        }
    }

    fn wire_to_bytes(&self, field: &str, wire: &str) -> RelayResult<Vec<u8>> {
        let invalid = |message: String| RelayError::InvalidPayload {
            field: field.to_string(),
            format: self.name().to_string(),
            message,
        };

        match self {
            Self::Raw => Ok(wire.as_bytes().to_vec()),
            Self::Base64 => general_purpose::STANDARD
                .decode(wire.trim())
                .map_err(|e| invalid(e.to_string())),
            Self::Hex => hex::decode(wire.trim()).map_err(|e| invalid(e.to_string())),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for WireFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

// ============================================================================
// Charset
// ============================================================================

/// Character encoding used between text and bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// UTF-8, the fallback for every unresolvable name
    pub fn utf8() -> Self {
        Self(UTF_8)
    }

    /// Look up an encoding by label or canonical name, ignoring case
    pub fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Encoding::for_label(name.as_bytes()).map(Self)
    }

    /// Resolve an optional name, falling back to UTF-8
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(Self::lookup).unwrap_or_else(Self::utf8)
    }

    /// Canonical encoding name
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    fn text_to_bytes(&self, text: &str) -> Vec<u8> {
        // encoding_rs never encodes into UTF-16, it substitutes UTF-8
        if self.0 == UTF_16LE {
            return text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        }
        if self.0 == UTF_16BE {
            return text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        }
        let (bytes, _, _) = self.0.encode(text);
        bytes.into_owned()
    }

    fn bytes_to_text(&self, bytes: &[u8]) -> String {
        self.0.decode_without_bom_handling(bytes).0.into_owned()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::utf8()
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Encode text into its wire string
pub fn encode(text: &str, format: WireFormat, charset: Charset) -> String {
    match format {
        WireFormat::Raw => text.to_string(),
        _ => format.bytes_to_wire(&charset.text_to_bytes(text)),
    }
}

/// Decode a wire string back into text
pub fn decode(wire: &str, format: WireFormat, charset: Charset) -> RelayResult<String> {
    decode_field("payload", wire, format, charset)
}

/// Decode a wire string, naming `field` in any error
pub(crate) fn decode_field(
    field: &str,
    wire: &str,
    format: WireFormat,
    charset: Charset,
) -> RelayResult<String> {
    match format {
        WireFormat::Raw => Ok(wire.to_string()),
        _ => Ok(charset.bytes_to_text(&format.wire_to_bytes(field, wire)?)),
    }
}

/// Encode with format and charset given by name
pub fn encode_named(
    text: Option<&str>,
    format: Option<&str>,
    charset: Option<&str>,
) -> RelayResult<Option<String>> {
    let Some(text) = text else {
        return Ok(None);
    };
    let format = WireFormat::resolve(format)?;
    Ok(Some(encode(text, format, Charset::resolve(charset))))
}

/// Decode with format and charset given by name
pub fn decode_named(
    wire: Option<&str>,
    format: Option<&str>,
    charset: Option<&str>,
) -> RelayResult<Option<String>> {
    let Some(wire) = wire else {
        return Ok(None);
    };
    let format = WireFormat::resolve(format)?;
    decode(wire, format, Charset::resolve(charset)).map(Some)
}
