//! Bearer-token authentication.
//!
//! A request carries `Authorization: Bearer <token>`. The configured
//! administrator token resolves to [`Principal::Admin`]; any other token is
//! looked up in the organization directory by digest.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use flow_store::Organization;
use flow_types::OrgId;
use std::sync::Arc;

use crate::api::{with_conn, ApiError};
use crate::AppState;

/// The authenticated caller, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin,
    Org(Organization),
}

impl Principal {
    /// The organization this principal acts for, if any.
    pub fn org_id(&self) -> Option<OrgId> {
        match self {
            Principal::Admin => None,
            Principal::Org(org) => Some(org.org_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin)
    }

    /// Name recorded as the creator of records made by this principal.
    pub fn label(&self) -> String {
        match self {
            Principal::Admin => "admin".to_string(),
            Principal::Org(org) => org.org_id.to_hex(),
        }
    }
}

/// Extracts the token from an `Authorization: Bearer` header value.
pub fn bearer_token(req_headers: &axum::http::HeaderMap) -> Option<String> {
    req_headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolves a bearer token to a principal.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for an unknown token.
pub async fn resolve_principal(state: &AppState, token: String) -> Result<Principal, ApiError> {
    if state
        .admin_token
        .as_deref()
        .is_some_and(|admin| admin == token)
    {
        return Ok(Principal::Admin);
    }

    let org = with_conn(&state.pool, move |conn| flow_store::authenticate(conn, &token)).await?;
    org.map(Principal::Org)
        .ok_or_else(|| ApiError::Unauthorized("invalid bearer token".to_string()))
}

/// Middleware that authenticates the request and inserts its [`Principal`].
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::InternalServerError("application state missing".to_string()))?
        .clone();

    let principal = resolve_principal(&state, token).await.inspect_err(|_| {
        tracing::warn!(path = %req.uri().path(), "rejected request with invalid bearer token");
    })?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn admin_has_no_org() {
        assert!(Principal::Admin.is_admin());
        assert_eq!(Principal::Admin.org_id(), None);
        assert_eq!(Principal::Admin.label(), "admin");
    }
}
