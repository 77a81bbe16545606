//! Subscription prefixes: parsing, mandatory padding, and matching.
//!
//! A registered prefix is always one of:
//!
//! - a topic-derived prefix: exactly 16 bytes (32 hex characters), used as-is;
//! - a raw/legacy prefix: at most 8 bytes, decoded according to its
//!   [`PrefixFormat`] and right-padded with zero bytes to exactly 8 bytes.
//!
//! Padding is applied server-side so that a client cannot subscribe with an
//! unpaddably short prefix that would match unrelated traffic.

use crate::error::IdError;
use base64::Engine;
use flow_types::{EVENT_ID_LEN, ORG_ID_LEN, TOPIC_PREFIX_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Maximum length in bytes of a raw prefix before padding.
pub const MAX_RAW_PREFIX_LEN: usize = ORG_ID_LEN;

/// How a raw prefix string is turned into bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrefixFormat {
    /// Hex digits; spaces, `-` and `:` are ignored.
    #[default]
    Hex,
    /// The UTF-8 bytes of the string.
    Utf8,
    /// Standard base64.
    Base64,
}

impl PrefixFormat {
    /// Returns the canonical tag for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Utf8 => "utf8",
            Self::Base64 => "base64",
        }
    }

    /// Decodes `input` into raw bytes according to this format.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidIdentifierFormat`] if the input is not valid
    /// for the format.
    pub fn decode(self, input: &str) -> Result<Vec<u8>, IdError> {
        match self {
            Self::Hex => decode_hex(input),
            Self::Utf8 => Ok(decode_utf8(input)),
            Self::Base64 => decode_base64(input),
        }
    }
}

fn decode_hex(input: &str) -> Result<Vec<u8>, IdError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | ':'))
        .collect();
    hex::decode(&cleaned)
        .map_err(|e| IdError::InvalidIdentifierFormat(format!("invalid hex prefix: {e}")))
}

fn decode_utf8(input: &str) -> Vec<u8> {
    input.as_bytes().to_vec()
}

fn decode_base64(input: &str) -> Result<Vec<u8>, IdError> {
    base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .map_err(|e| IdError::InvalidIdentifierFormat(format!("invalid base64 prefix: {e}")))
}

impl fmt::Display for PrefixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrefixFormat {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(Self::Hex),
            "utf8" => Ok(Self::Utf8),
            "base64" => Ok(Self::Base64),
            other => Err(IdError::UnknownPrefixFormat(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for PrefixFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for PrefixFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A normalized (lowercase hex) prefix of at most 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix(String);

impl Prefix {
    /// Builds a prefix from raw bytes (at most 32).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(EVENT_ID_LEN);
        Self(hex::encode(&bytes[..len]))
    }

    /// Parses a hex prefix of 0..=64 characters, normalizing to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidIdentifierFormat`] if the input is longer
    /// than a full identifier or contains non-hex characters.
    pub fn from_hex(input: &str) -> Result<Self, IdError> {
        if input.len() > EVENT_ID_LEN * 2 {
            return Err(IdError::InvalidIdentifierFormat(format!(
                "prefix has {} hex characters (max {})",
                input.len(),
                EVENT_ID_LEN * 2
            )));
        }
        if !input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdError::InvalidIdentifierFormat(
                "prefix contains non-hex characters".to_string(),
            ));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    /// Right-pads a raw prefix with zero bytes to exactly 8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::PrefixTooLong`] if `raw` exceeds 8 bytes.
    pub fn pad_raw(raw: &[u8]) -> Result<Self, IdError> {
        if raw.len() > MAX_RAW_PREFIX_LEN {
            return Err(IdError::PrefixTooLong {
                len: raw.len(),
                max: MAX_RAW_PREFIX_LEN,
            });
        }
        let mut padded = [0u8; MAX_RAW_PREFIX_LEN];
        padded[..raw.len()].copy_from_slice(raw);
        Ok(Self::from_bytes(&padded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this prefix has the topic-derived 16-byte length.
    pub fn is_topic(&self) -> bool {
        self.0.len() == TOPIC_PREFIX_LEN * 2
    }

    /// Returns `true` if `event_id_hex` starts with this prefix.
    pub fn matches(&self, event_id_hex: &str) -> bool {
        matches(event_id_hex, &self.0)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Resolves a client-supplied prefix to the form that is registered or polled.
///
/// Exactly 32 hex characters in [`PrefixFormat::Hex`] are taken as a
/// topic-derived prefix. Anything else is decoded per `format`, checked
/// against the 8-byte cap, and zero-padded to 8 bytes.
///
/// # Errors
///
/// Returns [`IdError::InvalidIdentifierFormat`] on undecodable input and
/// [`IdError::PrefixTooLong`] when the raw prefix exceeds 8 bytes.
pub fn resolve_prefix(input: &str, format: PrefixFormat) -> Result<Prefix, IdError> {
    if format == PrefixFormat::Hex {
        let bytes = decode_hex(input)?;
        if bytes.len() == TOPIC_PREFIX_LEN {
            return Ok(Prefix::from_bytes(&bytes));
        }
        return Prefix::pad_raw(&bytes);
    }
    Prefix::pad_raw(&format.decode(input)?)
}

/// Case-insensitive `event_id_hex.starts_with(prefix_hex)`.
///
/// Equivalent to comparing the first `4 * prefix_hex.len()` bits of the
/// identifier.
pub fn matches(event_id_hex: &str, prefix_hex: &str) -> bool {
    let id = event_id_hex.as_bytes();
    let prefix = prefix_hex.as_bytes();
    id.len() >= prefix.len() && id[..prefix.len()].eq_ignore_ascii_case(prefix)
}
