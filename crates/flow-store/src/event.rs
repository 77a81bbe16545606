//! Stored event records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flow_types::{format_timestamp, EventId, Notification, OrgId};
use serde::Serialize;

/// An event as stored. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub org_id: OrgId,
    /// Microseconds since the Unix epoch, UTC.
    pub timestamp_us: i64,
    pub body: Vec<u8>,
}

impl Event {
    /// RFC 3339 rendering of the append time.
    pub fn timestamp(&self) -> String {
        format_timestamp(self.timestamp_us)
    }

    /// The metadata-only record pushed to subscribers.
    pub fn notification(&self) -> Notification {
        Notification {
            id: self.id,
            org_id: self.org_id,
            timestamp: self.timestamp(),
            body_length: self.body.len(),
        }
    }

    /// Renders the body for display: UTF-8 text when valid, base64 otherwise.
    pub fn display_body(&self) -> DisplayBody {
        match std::str::from_utf8(&self.body) {
            Ok(text) => DisplayBody {
                body: text.to_string(),
                body_format: BodyFormat::Utf8,
                body_length: self.body.len(),
            },
            Err(_) => DisplayBody {
                body: STANDARD.encode(&self.body),
                body_format: BodyFormat::Base64,
                body_length: self.body.len(),
            },
        }
    }
}

/// An event about to be appended. The owning organization is read from the
/// identifier itself.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: EventId,
    pub timestamp_us: i64,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Utf8,
    Base64,
}

/// Display form of an event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayBody {
    pub body: String,
    pub body_format: BodyFormat,
    pub body_length: usize,
}
