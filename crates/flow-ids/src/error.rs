//! Error types for identifier, prefix, and secret handling.

use flow_types::ParseIdError;

/// Errors produced by the identifier codec, prefix resolution, and client
/// secret import.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// An identifier or prefix had the wrong length or contained non-hex
    /// characters.
    #[error("invalid identifier format: {0}")]
    InvalidIdentifierFormat(String),

    /// A raw prefix exceeded the 8-byte cap before padding.
    #[error("prefix too long: {len} bytes (max {max} bytes)")]
    PrefixTooLong {
        /// Decoded length of the supplied prefix.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// The prefix format tag was not one of `hex`, `utf8`, `base64`.
    #[error("unknown prefix format: {0}")]
    UnknownPrefixFormat(String),

    /// A client secret or exported secret blob could not be used.
    #[error("invalid client secret: {0}")]
    InvalidSecret(String),
}

impl From<ParseIdError> for IdError {
    fn from(err: ParseIdError) -> Self {
        Self::InvalidIdentifierFormat(err.to_string())
    }
}
