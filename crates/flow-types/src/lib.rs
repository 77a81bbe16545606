//! Shared types, error definitions, and constants for the Flow event stream.
//!
//! This crate provides the value types used across all Flow crates: the
//! 8-byte organization identifier, the 32-byte event identifier, timestamp
//! rendering helpers, and the metadata-only [`Notification`] record pushed to
//! subscribers.
//!
//! No crate in the workspace depends on anything *except* `flow-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an organization identifier in bytes.
pub const ORG_ID_LEN: usize = 8;

/// Length of the topic hash field of an event identifier.
pub const TOPIC_HASH_LEN: usize = 4;

/// Length of the topic nonce field of an event identifier.
pub const TOPIC_NONCE_LEN: usize = 4;

/// Length of the per-event random tail of an event identifier.
pub const RANDOM_LEN: usize = 16;

/// Length of a full event identifier in bytes.
pub const EVENT_ID_LEN: usize = ORG_ID_LEN + TOPIC_HASH_LEN + TOPIC_NONCE_LEN + RANDOM_LEN;

/// Length in bytes of the deterministic routing head (org + hash + nonce).
pub const TOPIC_PREFIX_LEN: usize = ORG_ID_LEN + TOPIC_HASH_LEN + TOPIC_NONCE_LEN;

/// Errors produced when parsing hex-encoded identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseIdError {
    /// The input did not have the exact number of hex characters required.
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Required number of hex characters.
        expected: usize,
        /// Number of characters supplied.
        actual: usize,
    },
    /// The input contained a character outside `[0-9a-fA-F]`.
    #[error("identifier contains non-hex characters")]
    InvalidHex,
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], ParseIdError> {
    if input.len() != N * 2 {
        return Err(ParseIdError::InvalidLength {
            expected: N * 2,
            actual: input.len(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(input, &mut out).map_err(|_| ParseIdError::InvalidHex)?;
    Ok(out)
}

/// An 8-byte tenant identifier. Rendered as 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrgId([u8; ORG_ID_LEN]);

impl OrgId {
    pub const fn from_bytes(bytes: [u8; ORG_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ORG_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for OrgId {
    type Err = ParseIdError;

    /// Parses 16 hex characters, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<ORG_ID_LEN>(s).map(Self)
    }
}

/// A 32-byte event identifier.
///
/// Layout: `org_id (8) || topic_hash (4) || topic_nonce (4) || random (16)`.
/// Rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId([u8; EVENT_ID_LEN]);

impl EventId {
    pub const fn from_bytes(bytes: [u8; EVENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; EVENT_ID_LEN] {
        &self.0
    }

    /// The organization that owns this identifier (bytes 0..8).
    pub fn org_id(&self) -> OrgId {
        let mut org = [0u8; ORG_ID_LEN];
        org.copy_from_slice(&self.0[..ORG_ID_LEN]);
        OrgId(org)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    /// Parses exactly 64 hex characters, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<EVENT_ID_LEN>(s).map(Self)
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(OrgId);
hex_serde!(EventId);

/// Error returned when a timestamp string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid timestamp: {0}")]
pub struct ParseTimestampError(pub String);

/// Current wall-clock time in microseconds since the Unix epoch (UTC).
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Renders a microsecond timestamp as RFC 3339 with a trailing `Z`.
pub fn format_timestamp(micros: i64) -> String {
    match Utc.timestamp_micros(micros).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        None => DateTime::<Utc>::default().to_rfc3339_opts(SecondsFormat::Micros, true),
    }
}

/// Parses an RFC 3339 timestamp, or an offset-less ISO-8601 timestamp
/// interpreted as UTC, into microseconds since the Unix epoch.
pub fn parse_timestamp(input: &str) -> Result<i64, ParseTimestampError> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).timestamp_micros());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_micros())
        .map_err(|_| ParseTimestampError(input.to_string()))
}

/// Metadata-only description of a stored event.
///
/// This is what subscribers receive on a persistent connection and what the
/// polling fallback returns. The body itself is never included; a consumer
/// fetches it separately by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EventId,
    pub org_id: OrgId,
    /// RFC 3339 UTC timestamp with microsecond precision.
    pub timestamp: String,
    pub body_length: usize,
}
