//! Polling fallback: `GET /events/watch`.
//!
//! Stateless. Each call re-derives "recent events matching a prefix" from a
//! bounded window of the store, so recall is best effort: a client that
//! polls too rarely can miss matches that fell out of the window.

use crate::api::{clamp_limit, with_conn, ApiError};
use crate::api_events::parse_since;
use crate::AppState;
use axum::extract::{Extension, Json, Query};
use flow_ids::{resolve_prefix, Prefix, PrefixFormat};
use flow_store::WatchQuery;
use flow_types::Notification;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct WatchParams {
    pub prefix: String,
    pub format: Option<String>,
    pub since: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub prefix_used: Prefix,
    pub events: Vec<Notification>,
}

/// `GET /events/watch?prefix=..&format=..&since=..&limit=..`
pub async fn watch_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WatchParams>,
) -> Result<Json<WatchResponse>, ApiError> {
    let format = match params.format.as_deref() {
        Some(tag) => tag.parse::<PrefixFormat>()?,
        None => PrefixFormat::default(),
    };
    let prefix = resolve_prefix(&params.prefix, format)?;
    let query = WatchQuery {
        since: parse_since(params.since.as_deref())?,
        limit: clamp_limit(params.limit, state.watch.default_limit, state.watch.max_limit),
        scan_cap: state.watch.scan_cap,
    };

    let scan_prefix = prefix.clone();
    let events = with_conn(&state.pool, move |conn| {
        flow_store::watch(conn, &scan_prefix, &query)
    })
    .await?;

    Ok(Json(WatchResponse {
        prefix_used: prefix,
        events: events.iter().map(|e| e.notification()).collect(),
    }))
}
