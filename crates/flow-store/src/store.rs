//! Persistence operations for the append-only event log.
//!
//! Writes go through [`append_event`]. Reads go through [`recent_events`]
//! (newest first) and [`get_event`] (exact identifier). [`watch`] layers the
//! bounded prefix scan of the polling fallback on top of the recency query.

use flow_ids::{IdError, Prefix};
use flow_types::{EventId, OrgId};
use rusqlite::{params, Connection, Row};

use crate::error::StoreError;
use crate::event::{Event, NewEvent};

type RawEvent = (String, String, i64, Vec<u8>);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_event((id, org_id, timestamp_us, body): RawEvent) -> Result<Event, StoreError> {
    Ok(Event {
        id: id.parse::<EventId>().map_err(IdError::from)?,
        org_id: org_id.parse::<OrgId>().map_err(IdError::from)?,
        timestamp_us,
        body,
    })
}

/// Appends a single event to the log.
///
/// # Errors
///
/// Returns `StoreError::DuplicateId` if an event with the same identifier
/// already exists, or `StoreError::Database` on other SQL failures.
pub fn append_event(conn: &Connection, new: &NewEvent) -> Result<Event, StoreError> {
    let id_hex = new.id.to_hex();
    let org_id = new.id.org_id();

    conn.execute(
        "INSERT INTO events (id, org_id, timestamp_us, body) VALUES (?1, ?2, ?3, ?4)",
        params![id_hex, org_id.to_hex(), new.timestamp_us, new.body],
    )
    .map_err(|e| StoreError::from_insert(e, &id_hex))?;

    tracing::debug!(event_id = %id_hex, org_id = %org_id, body_length = new.body.len(), "event appended");

    Ok(Event {
        id: new.id,
        org_id,
        timestamp_us: new.timestamp_us,
        body: new.body.clone(),
    })
}

/// Returns up to `limit` events, newest first.
///
/// With `since`, only events strictly later than that timestamp (in
/// microseconds) are considered. Ties on timestamp are broken by append
/// order, newest first.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure or `StoreError::Id` if a
/// stored row carries a malformed identifier.
pub fn recent_events(
    conn: &Connection,
    since: Option<i64>,
    limit: usize,
) -> Result<Vec<Event>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        "SELECT id, org_id, timestamp_us, body
         FROM events
         WHERE ?1 IS NULL OR timestamp_us > ?1
         ORDER BY timestamp_us DESC, seq DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since, limit], read_raw)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(into_event(row?)?);
    }
    Ok(events)
}

/// Fetches a single event by identifier.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if no event has this identifier.
pub fn get_event(conn: &Connection, id: &EventId) -> Result<Event, StoreError> {
    let id_hex = id.to_hex();
    let raw = conn
        .query_row(
            "SELECT id, org_id, timestamp_us, body FROM events WHERE id = ?1",
            [&id_hex],
            read_raw,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id_hex.clone()),
            other => StoreError::Database(other),
        })?;
    into_event(raw)
}

/// Parameters of a bounded prefix scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchQuery {
    /// Exclusive lower bound on event timestamps, in microseconds.
    pub since: Option<i64>,
    /// Maximum number of matches to return.
    pub limit: usize,
    /// Hard cap on the number of recent events examined, independent of
    /// `limit`.
    pub scan_cap: usize,
}

/// Returns events whose identifier starts with `prefix`, newest first.
///
/// Only the `scan_cap` most recent events after `since` are examined. If
/// more than that many events arrived since `since`, older matches are
/// missed; callers poll often enough to stay under the cap.
///
/// # Errors
///
/// Returns any error from [`recent_events`].
pub fn watch(
    conn: &Connection,
    prefix: &Prefix,
    query: &WatchQuery,
) -> Result<Vec<Event>, StoreError> {
    let window = recent_events(conn, query.since, query.scan_cap)?;
    let scanned = window.len();
    let matched = select_matching(window, prefix, query.limit);
    tracing::debug!(
        prefix = %prefix,
        scanned,
        matched = matched.len(),
        "watch window filtered"
    );
    Ok(matched)
}

/// Keeps the first `limit` events of `window` whose identifier matches
/// `prefix`, preserving order.
pub fn select_matching(
    window: impl IntoIterator<Item = Event>,
    prefix: &Prefix,
    limit: usize,
) -> Vec<Event> {
    window
        .into_iter()
        .filter(|event| prefix.matches(&event.id.to_hex()))
        .take(limit)
        .collect()
}
