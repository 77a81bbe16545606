//! Event submission, listing and fetch-by-id.

use crate::api::{clamp_limit, with_conn, ApiError};
use crate::middleware::Principal;
use crate::AppState;
use axum::extract::{Extension, Json, Path, Query};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flow_ids::{decode, encode, topic_hash};
use flow_store::{BodyFormat, NewEvent};
use flow_types::{parse_timestamp, EventId, Notification, OrgId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the `body` string of a submission is turned into bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitEventRequest {
    pub body: String,
    #[serde(default)]
    pub body_encoding: BodyEncoding,
    /// Pre-computed 64-character identifier.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitEventResponse {
    pub id: EventId,
    pub org_id: OrgId,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: EventId,
    pub org_id: OrgId,
    pub timestamp: String,
    pub body: String,
    pub body_format: BodyFormat,
    pub body_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    pub since: Option<String>,
    pub limit: Option<usize>,
}

/// Parses an optional `since` query value into microseconds.
pub(crate) fn parse_since(since: Option<&str>) -> Result<Option<i64>, ApiError> {
    since
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_timestamp(s).map_err(|e| ApiError::BadRequest(e.to_string())))
        .transpose()
}

fn decode_body(body: String, encoding: BodyEncoding) -> Result<Vec<u8>, ApiError> {
    match encoding {
        BodyEncoding::Utf8 => Ok(body.into_bytes()),
        BodyEncoding::Base64 => STANDARD
            .decode(body.trim())
            .map_err(|e| ApiError::BadRequest(format!("invalid base64 body: {}", e))),
    }
}

/// Picks the identifier for a submission.
///
/// A supplied id must belong to the caller's organization (the
/// administrator may submit for any organization) and, when a topic is also
/// given, must carry that topic's hash. Without an id the server encodes
/// one for the caller's organization; it never holds topic keys, so the
/// nonce field is zero.
fn choose_event_id(
    principal: &Principal,
    id: Option<&str>,
    topic: Option<&str>,
) -> Result<EventId, ApiError> {
    let topic = topic.filter(|t| !t.is_empty());

    let Some(id_hex) = id else {
        let org_id = principal.org_id().ok_or_else(|| {
            ApiError::BadRequest("administrator submissions must supply an id".to_string())
        })?;
        return Ok(encode(org_id, topic, None));
    };

    let decoded = decode(id_hex)?;
    if let Some(own) = principal.org_id() {
        if decoded.org_id != own {
            return Err(ApiError::Forbidden(format!(
                "identifier belongs to organization {}",
                decoded.org_id
            )));
        }
    }
    if let Some(path) = topic {
        if decoded.topic_hash != topic_hash(path) {
            return Err(ApiError::BadRequest(
                "identifier does not carry the topic hash of the given topic".to_string(),
            ));
        }
    }
    Ok(decoded.to_event_id())
}

/// `POST /events`: stores the event, then dispatches its notification
/// before responding.
pub async fn submit_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SubmitEventRequest>,
) -> Result<Json<SubmitEventResponse>, ApiError> {
    let id = choose_event_id(&principal, payload.id.as_deref(), payload.topic.as_deref())?;
    let body = decode_body(payload.body, payload.body_encoding)?;

    let check_org = principal.is_admin();
    // The slot is held until dispatch finishes so that notifications leave
    // in append order.
    let slot = state.dispatcher.begin_append().await;
    let new_event = NewEvent {
        id,
        timestamp_us: slot.timestamp_us(),
        body,
    };
    let event = with_conn(&state.pool, move |conn| {
        if check_org {
            flow_store::get_organization(conn, new_event.id.org_id())?;
        }
        flow_store::append_event(conn, &new_event)
    })
    .await?;

    tracing::info!(
        event_id = %event.id,
        org_id = %event.org_id,
        body_length = event.body.len(),
        "event stored"
    );

    // Delivery outcome is not reported to the producer.
    state.dispatcher.on_append(&event.notification()).await;
    drop(slot);

    Ok(Json(SubmitEventResponse {
        id: event.id,
        org_id: event.org_id,
        timestamp: event.timestamp(),
    }))
}

/// `GET /events`: metadata of the most recent events, newest first.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let since = parse_since(params.since.as_deref())?;
    let limit = clamp_limit(params.limit, state.watch.default_limit, state.watch.max_limit);

    let events = with_conn(&state.pool, move |conn| {
        flow_store::recent_events(conn, since, limit)
    })
    .await?;

    Ok(Json(events.iter().map(|e| e.notification()).collect()))
}

/// `GET /events/{id}`: the stored event with its body.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id_hex): Path<String>,
) -> Result<Json<EventResponse>, ApiError> {
    let id = decode(&id_hex)?.to_event_id();
    let event = with_conn(&state.pool, move |conn| flow_store::get_event(conn, &id)).await?;

    let shown = event.display_body();
    Ok(Json(EventResponse {
        id: event.id,
        org_id: event.org_id,
        timestamp: event.timestamp(),
        body: shown.body,
        body_format: shown.body_format,
        body_length: shown.body_length,
    }))
}
