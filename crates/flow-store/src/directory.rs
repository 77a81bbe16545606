//! Organization directory: creation, token issuance and authentication.
//!
//! Tokens are returned in plaintext exactly once, at creation. Only their
//! SHA-256 digest is stored, so a leaked database does not leak credentials.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flow_ids::{IdError, MAX_RAW_PREFIX_LEN};
use flow_types::{format_timestamp, now_micros, OrgId, ORG_ID_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

const TOKEN_BYTES: usize = 32;

/// A tenant record. Never carries the token or any topic key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub org_id: OrgId,
    pub created_by: String,
    pub created_at: String,
}

/// A newly created organization together with its one-time plaintext token.
#[derive(Debug, Clone)]
pub struct IssuedOrganization {
    pub organization: Organization,
    pub token: String,
}

/// Generates a bearer token: 32 random bytes, base64url without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a bearer token, as stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn org_id_with_vanity(vanity: &[u8]) -> Result<OrgId, IdError> {
    if vanity.len() > MAX_RAW_PREFIX_LEN {
        return Err(IdError::PrefixTooLong {
            len: vanity.len(),
            max: MAX_RAW_PREFIX_LEN,
        });
    }
    let mut bytes = [0u8; ORG_ID_LEN];
    bytes[..vanity.len()].copy_from_slice(vanity);
    OsRng.fill_bytes(&mut bytes[vanity.len()..]);
    Ok(OrgId::from_bytes(bytes))
}

/// Creates an organization whose id begins with `vanity` and issues its token.
///
/// The remaining id bytes are random. A full 8-byte vanity prefix fixes the
/// id completely, so creating it twice fails.
///
/// # Errors
///
/// Returns `StoreError::Id` if `vanity` exceeds 8 bytes,
/// `StoreError::DuplicateId` if the resulting id is taken, or
/// `StoreError::Database` on other SQL failures.
pub fn create_organization(
    conn: &Connection,
    created_by: &str,
    vanity: &[u8],
) -> Result<IssuedOrganization, StoreError> {
    let org_id = org_id_with_vanity(vanity)?;
    let token = generate_token();
    let created_at = format_timestamp(now_micros());

    conn.execute(
        "INSERT INTO organizations (org_id, token_hash, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![org_id.to_hex(), hash_token(&token), created_by, created_at],
    )
    .map_err(|e| StoreError::from_insert(e, &org_id.to_hex()))?;

    tracing::info!(org_id = %org_id, created_by, "organization created");

    Ok(IssuedOrganization {
        organization: Organization {
            org_id,
            created_by: created_by.to_string(),
            created_at,
        },
        token,
    })
}

fn read_organization(
    (org_id, created_by, created_at): (String, String, String),
) -> Result<Organization, StoreError> {
    Ok(Organization {
        org_id: org_id.parse::<OrgId>().map_err(IdError::from)?,
        created_by,
        created_at,
    })
}

/// Resolves a bearer token to its organization.
///
/// Returns `Ok(None)` for an unknown token.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn authenticate(conn: &Connection, token: &str) -> Result<Option<Organization>, StoreError> {
    let row = conn
        .query_row(
            "SELECT org_id, created_by, created_at FROM organizations WHERE token_hash = ?1",
            [hash_token(token)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    row.map(read_organization).transpose()
}

/// Looks up an organization by id.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the organization does not exist.
pub fn get_organization(conn: &Connection, org_id: OrgId) -> Result<Organization, StoreError> {
    let row = conn
        .query_row(
            "SELECT org_id, created_by, created_at FROM organizations WHERE org_id = ?1",
            [org_id.to_hex()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(org_id.to_hex()))?;
    read_organization(row)
}
