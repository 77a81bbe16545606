//! Topic key derivation and shareable topic prefixes.
//!
//! A topic key is a pure function of a client-held secret:
//!
//! `topicKey = HMAC-SHA256(TOPIC_KEY_SALT, secret)`
//!
//! Any client holding the same secret derives the same key on any machine,
//! and therefore the same subscription address for a given topic path,
//! without a server round-trip. The salt is public; it only separates this
//! derivation from other uses of the same secret.

use crate::codec::{routing_head, DecodedId};
use crate::prefix::Prefix;
use flow_types::{OrgId, TOPIC_PREFIX_LEN};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

/// Fixed, publicly known domain-separation salt for topic key derivation.
pub const TOPIC_KEY_SALT: &[u8] = b"supercortex-flow/topic-key/v1";

/// Length of a topic key in bytes.
pub const TOPIC_KEY_LEN: usize = 32;

/// A 32-byte key used to compute topic nonces.
#[derive(Clone, PartialEq, Eq)]
pub struct TopicKey([u8; TOPIC_KEY_LEN]);

impl TopicKey {
    pub const fn from_bytes(bytes: [u8; TOPIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_KEY_LEN] {
        &self.0
    }
}

// Keys never appear in logs.
impl fmt::Debug for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TopicKey(..)")
    }
}

pub(crate) fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Derives the topic key for a client secret.
pub fn derive_topic_key(secret: &str) -> TopicKey {
    TopicKey(hmac_sha256(TOPIC_KEY_SALT, secret.as_bytes()))
}

/// Computes the canonical shareable address for a topic:
/// `org_id || topic_hash(topic_path) || topic_nonce(derive(secret), topic_path)`.
///
/// The result is always 32 hex characters. Anyone holding it can subscribe to
/// exactly that topic's events without learning the secret or the path.
pub fn compute_topic_prefix(org_id: OrgId, topic_path: &str, secret: &str) -> Prefix {
    let key = derive_topic_key(secret);
    topic_prefix_with_key(org_id, topic_path, &key)
}

/// Same as [`compute_topic_prefix`] for a caller that already holds the key.
pub fn topic_prefix_with_key(org_id: OrgId, topic_path: &str, key: &TopicKey) -> Prefix {
    let head: [u8; TOPIC_PREFIX_LEN] = routing_head(org_id, Some(topic_path), Some(key));
    Prefix::from_bytes(&head)
}

/// Returns `true` when a decoded identifier was produced for `topic_path`
/// under `key` within `org_id`.
pub fn belongs_to_topic(decoded: &DecodedId, org_id: OrgId, topic_path: &str, key: &TopicKey) -> bool {
    let head = routing_head(org_id, Some(topic_path), Some(key));
    decoded.routing_head() == head
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, topic_hash, topic_nonce};

    fn org() -> OrgId {
        "deadbeefdeadbeef".parse().unwrap()
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_topic_key("s3cr3t");
        let b = derive_topic_key("s3cr3t");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derive_differs_per_secret() {
        assert_ne!(
            derive_topic_key("s3cr3t").as_bytes(),
            derive_topic_key("s3cr3t!").as_bytes()
        );
    }

    #[test]
    fn derive_matches_hmac_with_fixed_salt() {
        let expected = hmac_sha256(TOPIC_KEY_SALT, b"s3cr3t");
        assert_eq!(derive_topic_key("s3cr3t").as_bytes(), &expected);
    }

    #[test]
    fn topic_prefix_is_32_hex_chars() {
        let prefix = compute_topic_prefix(org(), "logs.errors", "s3cr3t");
        assert_eq!(prefix.as_str().len(), 32);
        assert!(prefix.as_str().starts_with("deadbeefdeadbeef"));
    }

    #[test]
    fn topic_prefix_layout_matches_fields() {
        let key = derive_topic_key("s3cr3t");
        let prefix = compute_topic_prefix(org(), "logs.errors", "s3cr3t");
        let expected = format!(
            "deadbeefdeadbeef{}{}",
            hex::encode(topic_hash("logs.errors")),
            hex::encode(topic_nonce(&key, "logs.errors"))
        );
        assert_eq!(prefix.as_str(), expected);
    }

    #[test]
    fn topic_prefix_differs_between_secrets() {
        let a = compute_topic_prefix(org(), "logs.errors", "first-secret");
        let b = compute_topic_prefix(org(), "logs.errors", "second-secret");
        assert_eq!(&a.as_str()[..24], &b.as_str()[..24], "org and hash are shared");
        assert_ne!(a, b, "nonce component must differ");
    }

    #[test]
    fn encoded_ids_belong_to_their_topic() {
        let key = derive_topic_key("s3cr3t");
        let id = encode(org(), Some("logs.errors"), Some(&key));
        let decoded = crate::codec::decode(&id.to_hex()).unwrap();
        assert!(belongs_to_topic(&decoded, org(), "logs.errors", &key));
        assert!(!belongs_to_topic(&decoded, org(), "logs.warnings", &key));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = derive_topic_key("s3cr3t");
        assert_eq!(format!("{key:?}"), "TopicKey(..)");
    }
}
