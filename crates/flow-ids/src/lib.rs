//! Identifier primitives for the Flow event stream.
//!
//! This crate implements the addressing scheme: the 256-bit event identifier
//! codec, deterministic topic key derivation from a client-held secret,
//! shareable topic prefixes, and the prefix rules used by both the
//! persistent subscription path and the polling fallback.
//!
//! # Core operations
//!
//! - [`encode`] / [`decode`]: the identifier codec
//! - [`derive_topic_key`]: `HMAC-SHA256(salt, secret)`
//! - [`compute_topic_prefix`]: the 32-hex-character address of a topic
//! - [`resolve_prefix`]: normalization and mandatory 8-byte padding of raw prefixes
//! - [`matches`]: case-insensitive leading-bits match

pub mod codec;
pub mod error;
pub mod prefix;
pub mod secret;
pub mod topic;

pub use codec::{decode, encode, routing_head, split, topic_hash, topic_nonce, DecodedId};
pub use error::IdError;
pub use prefix::{matches, resolve_prefix, Prefix, PrefixFormat, MAX_RAW_PREFIX_LEN};
pub use secret::{ClientSecret, SecretBundle};
pub use topic::{
    belongs_to_topic, compute_topic_prefix, derive_topic_key, topic_prefix_with_key, TopicKey,
    TOPIC_KEY_SALT,
};
