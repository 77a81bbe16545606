//! Organization administration.

use crate::api::{with_conn, ApiError};
use crate::middleware::Principal;
use crate::AppState;
use axum::extract::{Extension, Json};
use flow_types::OrgId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrgRequest {
    /// Up to 8 hex-encoded bytes the new org id should start with.
    #[serde(default)]
    pub vanity_prefix: Option<String>,
}

/// Returned once; the token cannot be recovered later.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrgResponse {
    pub org_id: OrgId,
    pub token: String,
    pub created_by: String,
    pub created_at: String,
}

/// `POST /orgs`: administrator only.
pub async fn create_org_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateOrgRequest>,
) -> Result<Json<CreateOrgResponse>, ApiError> {
    if !principal.is_admin() {
        return Err(ApiError::Forbidden(
            "only the administrator can create organizations".to_string(),
        ));
    }

    let vanity = match payload.vanity_prefix.as_deref().map(str::trim) {
        Some(hex_str) if !hex_str.is_empty() => hex::decode(hex_str)
            .map_err(|_| ApiError::BadRequest("vanity_prefix must be hex".to_string()))?,
        _ => Vec::new(),
    };

    let created_by = principal.label();
    let issued = with_conn(&state.pool, move |conn| {
        flow_store::create_organization(conn, &created_by, &vanity)
    })
    .await?;

    Ok(Json(CreateOrgResponse {
        org_id: issued.organization.org_id,
        token: issued.token,
        created_by: issued.organization.created_by,
        created_at: issued.organization.created_at,
    }))
}
