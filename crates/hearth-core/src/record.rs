//! The event record delivered to the collector.
//!
//! [`EventRecord`] is the immutable wire envelope: once constructed it is
//! never mutated, only moved between the queue and the transport. Field
//! names are the collector contract (`snake_case`), and `occurred_at` is
//! assigned at enqueue time, not at send time, so retried batches keep
//! their original timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{AnonymousId, SessionId, UserId};

/// One behavioral event, as delivered to the collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Durable anonymous identifier of the browser profile.
    pub anon_id: AnonymousId,
    /// Authenticated principal, when signed in.
    pub user_id: Option<UserId>,
    /// Canonical event name (see [`crate::constants`]).
    pub event_name: String,
    /// Open string-keyed map of JSON-serializable values.
    pub event_props: Map<String, Value>,
    /// ISO-8601 timestamp assigned at enqueue time.
    pub occurred_at: String,
}

impl EventRecord {
    /// Build a record with the given enqueue timestamp.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        anon_id: AnonymousId,
        user_id: Option<UserId>,
        event_name: impl Into<String>,
        event_props: Map<String, Value>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            anon_id,
            user_id,
            event_name: event_name.into(),
            event_props,
            occurred_at: format_timestamp(occurred_at),
        }
    }
}

/// Format a timestamp the way the collector expects (RFC 3339, millis, Z).
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
