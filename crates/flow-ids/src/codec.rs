//! The 256-bit event identifier codec.
//!
//! | bytes | field | derivation |
//! |-------|-------|------------|
//! | 0..8 | `org_id` | caller-supplied |
//! | 8..12 | `topic_hash` | `SHA256(topic_path)[..4]`, zero without a topic path |
//! | 12..16 | `topic_nonce` | `HMAC-SHA256(topic_key, topic_path)[..4]`, zero without a path or key |
//! | 16..32 | `random` | OS CSPRNG |
//!
//! The first 16 bytes are a pure function of `(org_id, topic_path, topic_key)`;
//! the random tail makes each event unique and carries no routing meaning.

use crate::error::IdError;
use crate::topic::{hmac_sha256, TopicKey};
use flow_types::{
    EventId, OrgId, EVENT_ID_LEN, ORG_ID_LEN, RANDOM_LEN, TOPIC_HASH_LEN, TOPIC_NONCE_LEN,
    TOPIC_PREFIX_LEN,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const HASH_START: usize = ORG_ID_LEN;
const NONCE_START: usize = HASH_START + TOPIC_HASH_LEN;
const RANDOM_START: usize = NONCE_START + TOPIC_NONCE_LEN;

/// The fields of a decoded event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    pub org_id: OrgId,
    pub topic_hash: [u8; TOPIC_HASH_LEN],
    pub topic_nonce: [u8; TOPIC_NONCE_LEN],
    pub random: [u8; RANDOM_LEN],
}

impl DecodedId {
    /// The deterministic first 16 bytes (org + hash + nonce).
    pub fn routing_head(&self) -> [u8; TOPIC_PREFIX_LEN] {
        let mut head = [0u8; TOPIC_PREFIX_LEN];
        head[..ORG_ID_LEN].copy_from_slice(self.org_id.as_bytes());
        head[HASH_START..NONCE_START].copy_from_slice(&self.topic_hash);
        head[NONCE_START..].copy_from_slice(&self.topic_nonce);
        head
    }

    /// Reassembles the identifier.
    pub fn to_event_id(&self) -> EventId {
        let mut bytes = [0u8; EVENT_ID_LEN];
        bytes[..TOPIC_PREFIX_LEN].copy_from_slice(&self.routing_head());
        bytes[RANDOM_START..].copy_from_slice(&self.random);
        EventId::from_bytes(bytes)
    }
}

/// First 4 bytes of `SHA256(topic_path)`.
pub fn topic_hash(topic_path: &str) -> [u8; TOPIC_HASH_LEN] {
    let digest = Sha256::digest(topic_path.as_bytes());
    let mut out = [0u8; TOPIC_HASH_LEN];
    out.copy_from_slice(&digest[..TOPIC_HASH_LEN]);
    out
}

/// First 4 bytes of `HMAC-SHA256(topic_key, topic_path)`.
pub fn topic_nonce(key: &TopicKey, topic_path: &str) -> [u8; TOPIC_NONCE_LEN] {
    let mac = hmac_sha256(key.as_bytes(), topic_path.as_bytes());
    let mut out = [0u8; TOPIC_NONCE_LEN];
    out.copy_from_slice(&mac[..TOPIC_NONCE_LEN]);
    out
}

/// Computes the deterministic 16-byte head of an identifier.
///
/// An empty topic path is treated the same as no topic path.
pub fn routing_head(
    org_id: OrgId,
    topic_path: Option<&str>,
    topic_key: Option<&TopicKey>,
) -> [u8; TOPIC_PREFIX_LEN] {
    let mut head = [0u8; TOPIC_PREFIX_LEN];
    head[..ORG_ID_LEN].copy_from_slice(org_id.as_bytes());

    if let Some(path) = topic_path.filter(|p| !p.is_empty()) {
        head[HASH_START..NONCE_START].copy_from_slice(&topic_hash(path));
        if let Some(key) = topic_key {
            head[NONCE_START..].copy_from_slice(&topic_nonce(key, path));
        }
    }
    head
}

/// Encodes a new event identifier with a fresh random tail.
pub fn encode(org_id: OrgId, topic_path: Option<&str>, topic_key: Option<&TopicKey>) -> EventId {
    let mut bytes = [0u8; EVENT_ID_LEN];
    bytes[..TOPIC_PREFIX_LEN].copy_from_slice(&routing_head(org_id, topic_path, topic_key));
    OsRng.fill_bytes(&mut bytes[RANDOM_START..]);
    EventId::from_bytes(bytes)
}

/// Decodes a 64-character hex identifier into its fields.
///
/// Decoding is case-insensitive.
///
/// # Errors
///
/// Returns [`IdError::InvalidIdentifierFormat`] unless the input is exactly
/// 64 hex characters.
pub fn decode(id_hex: &str) -> Result<DecodedId, IdError> {
    let id: EventId = id_hex.parse()?;
    Ok(split(&id))
}

/// Splits an already-parsed identifier into its fields.
pub fn split(id: &EventId) -> DecodedId {
    let bytes = id.as_bytes();
    let mut topic_hash = [0u8; TOPIC_HASH_LEN];
    let mut topic_nonce = [0u8; TOPIC_NONCE_LEN];
    let mut random = [0u8; RANDOM_LEN];
    topic_hash.copy_from_slice(&bytes[HASH_START..NONCE_START]);
    topic_nonce.copy_from_slice(&bytes[NONCE_START..RANDOM_START]);
    random.copy_from_slice(&bytes[RANDOM_START..]);

    DecodedId {
        org_id: id.org_id(),
        topic_hash,
        topic_nonce,
        random,
    }
}
