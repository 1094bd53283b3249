//! Persistence operations for the analytics log.
//!
//! All writes go through [`emit_event`], which serialises the payload,
//! assigns the next sequence number, and inserts into `analytics_events`
//! in a single statement.

use relay_types::UserKey;
use rusqlite::{params, Connection};

use crate::error::ObserveError;
use crate::event::{AnalyticsEvent, EventDomain, EventPayload};

/// Events returned by [`query_events`] when no limit is given.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Upper bound on any single query.
const MAX_QUERY_LIMIT: i64 = 1000;

/// Appends one event. Domain and event type come from the payload.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` if the payload cannot be serialised.
pub fn emit_event(
    conn: &Connection,
    user_key: UserKey,
    payload: &EventPayload,
) -> Result<AnalyticsEvent, ObserveError> {
    let payload_json = serde_json::to_string(payload)?;
    let domain = payload.domain();
    let event_type = payload.event_type();

    // Sequence assignment and insert in one statement; the UNIQUE seq
    // column rejects a concurrent writer that computed the same value.
    let (id, seq, occurred_at) = conn.query_row(
        "INSERT INTO analytics_events
            (user_key, domain, event_type, seq, payload_json, occurred_at)
         VALUES (
            ?1, ?2, ?3,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM analytics_events),
            ?4,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![user_key.as_i64(), domain.as_str(), event_type, payload_json],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    )?;

    tracing::trace!(%user_key, event_type, seq, "analytics event recorded");

    Ok(AnalyticsEvent {
        id,
        user_key,
        domain: domain.as_str().to_string(),
        event_type: event_type.to_string(),
        seq,
        payload_json,
        occurred_at,
    })
}

/// Returns the sequence number the next event will receive.
pub fn next_seq(conn: &Connection) -> Result<i64, ObserveError> {
    let max_seq: Option<i64> =
        conn.query_row("SELECT MAX(seq) FROM analytics_events", [], |row| row.get(0))?;
    Ok(max_seq.unwrap_or(0) + 1)
}

/// Filter criteria for querying the analytics log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_key: Option<UserKey>,
    pub domain: Option<EventDomain>,
    pub event_type: Option<String>,
    /// Only events with a sequence number greater than this.
    pub after_seq: Option<i64>,
    /// Maximum number of events to return (default 100, capped at 1000).
    pub limit: Option<i64>,
}

/// Queries the log, oldest first.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure.
pub fn query_events(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<AnalyticsEvent>, ObserveError> {
    // WHERE clauses and bind parameters are collected separately so nothing
    // is interpolated.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(user_key) = filter.user_key {
        clauses.push(format!("user_key = ?{idx}"));
        param_values.push(Box::new(user_key.as_i64()));
        idx += 1;
    }

    if let Some(domain) = filter.domain {
        clauses.push(format!("domain = ?{idx}"));
        param_values.push(Box::new(domain.as_str().to_string()));
        idx += 1;
    }

    if let Some(ref et) = filter.event_type {
        clauses.push(format!("event_type = ?{idx}"));
        param_values.push(Box::new(et.clone()));
        idx += 1;
    }

    if let Some(after) = filter.after_seq {
        clauses.push(format!("seq > ?{idx}"));
        param_values.push(Box::new(after));
        idx += 1;
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, user_key, domain, event_type, seq, payload_json, occurred_at
         FROM analytics_events
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(limit));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(AnalyticsEvent {
            id: row.get(0)?,
            user_key: UserKey(row.get(1)?),
            domain: row.get(2)?,
            event_type: row.get(3)?,
            seq: row.get(4)?,
            payload_json: row.get(5)?,
            occurred_at: row.get(6)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    Ok(events)
}
