//! Client secrets and their portable export format.
//!
//! A client secret never reaches the server. Cooperating client instances
//! share it out of band using the tagged blob produced by
//! [`SecretBundle::export`]:
//!
//! `flowsecret:v1:` + base64url(`{"v":1,"org_id":..,"secret":..}`)

use crate::error::IdError;
use crate::topic::{derive_topic_key, TopicKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flow_types::OrgId;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes in a generated secret (256 bits).
pub const SECRET_BYTES: usize = 32;

/// Tag that prefixes every exported secret blob.
pub const EXPORT_TAG: &str = "flowsecret:v1:";

const EXPORT_VERSION: u8 = 1;

/// A client-held secret from which topic keys are derived.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);

impl ClientSecret {
    /// Generates a fresh secret from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps an existing secret string.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidSecret`] if the secret is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self, IdError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(IdError::InvalidSecret("secret cannot be empty".to_string()));
        }
        Ok(Self(secret))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn topic_key(&self) -> TopicKey {
        derive_topic_key(&self.0)
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(..)")
    }
}

#[derive(Serialize, Deserialize)]
struct ExportedSecret {
    v: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    org_id: Option<OrgId>,
    secret: String,
}

/// A secret together with the organization it is used under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBundle {
    pub org_id: Option<OrgId>,
    pub secret: ClientSecret,
}

impl SecretBundle {
    /// Renders the bundle as a versioned, tagged text blob.
    pub fn export(&self) -> String {
        let payload = ExportedSecret {
            v: EXPORT_VERSION,
            org_id: self.org_id,
            secret: self.secret.0.clone(),
        };
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        format!("{EXPORT_TAG}{}", URL_SAFE_NO_PAD.encode(json))
    }

    /// Parses a blob produced by [`SecretBundle::export`].
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidSecret`] if the tag is missing, the payload
    /// is malformed, the version is unknown, or the secret is empty.
    pub fn import(blob: &str) -> Result<Self, IdError> {
        let encoded = blob
            .trim()
            .strip_prefix(EXPORT_TAG)
            .ok_or_else(|| IdError::InvalidSecret("missing export tag".to_string()))?;
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| IdError::InvalidSecret(format!("invalid encoding: {e}")))?;
        let payload: ExportedSecret = serde_json::from_slice(&json)
            .map_err(|e| IdError::InvalidSecret(format!("invalid payload: {e}")))?;
        if payload.v != EXPORT_VERSION {
            return Err(IdError::InvalidSecret(format!(
                "unsupported version {}",
                payload.v
            )));
        }
        Ok(Self {
            org_id: payload.org_id,
            secret: ClientSecret::new(payload.secret)?,
        })
    }
}
