//! Session lifecycle.
//!
//! Two logical states: **no-session** and **active**. Every call to
//! [`SessionManager::ensure_session`] either starts a session, refreshes
//! the current one, or rotates an expired one, and reports which via
//! [`SessionOutcome`] so the caller can emit the boundary events and clear
//! session-scoped state. The manager itself never touches the queue.
//!
//! The session is persisted to ephemeral per-tab storage, so a reload
//! within the idle window continues the same session. The `session_end`
//! boundary for an expired session carries the *old* `last_activity_at`,
//! not the rotation time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hearth_core::{Clock, SessionId};
use hearth_storage::KeyValueStorage;

/// Ephemeral-storage key holding the active session.
const SESSION_KEY: &str = "hearth.session";

/// The active session's state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub session_id: SessionId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Last observed activity; expiry is measured from here.
    pub last_activity_at: DateTime<Utc>,
}

/// What a just-expired session looked like, for the `session_end` event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndedSession {
    /// The expired session's id.
    pub session_id: SessionId,
    /// Its final activity timestamp — the `session_end` event's timestamp.
    pub last_activity_at: DateTime<Utc>,
}

/// Result of [`SessionManager::ensure_session`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No session existed; a new one started. Emit `session_start`.
    Started {
        /// The new session.
        session: Session,
    },
    /// The session was still live; its activity timestamp was refreshed.
    Continued {
        /// The refreshed session.
        session: Session,
    },
    /// The previous session idled out. Emit `session_end` for `ended`,
    /// clear session-scoped state, then emit `session_start` for `session`.
    Rotated {
        /// The expired session.
        ended: EndedSession,
        /// The replacement session.
        session: Session,
    },
}

impl SessionOutcome {
    /// The session that is current after this outcome.
    #[must_use]
    pub fn session(&self) -> &Session {
        match self {
            Self::Started { session }
            | Self::Continued { session }
            | Self::Rotated { session, .. } => session,
        }
    }
}

/// Owns the short-lived session identifier and its idle-timeout expiry.
pub struct SessionManager {
    ephemeral: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    current: Option<Session>,
    degraded: bool,
}

impl SessionManager {
    /// Create a manager, resuming any session persisted in this tab.
    pub fn new(
        ephemeral: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        idle_timeout_ms: u64,
    ) -> Self {
        let mut degraded = false;
        let current = match ephemeral.get(SESSION_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable persisted session");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "ephemeral storage unavailable; session state is in-memory only");
                degraded = true;
                None
            }
        };

        Self {
            ephemeral,
            clock,
            idle_timeout: Duration::milliseconds(i64::try_from(idle_timeout_ms).unwrap_or(i64::MAX)),
            current,
            degraded,
        }
    }

    /// Validate or renew the session. See [`SessionOutcome`] for the
    /// boundary events the caller must emit.
    pub fn ensure_session(&mut self) -> SessionOutcome {
        let now = self.clock.now();

        match self.current.take() {
            None => {
                let session = self.start_session(now);
                SessionOutcome::Started { session }
            }
            Some(old) if now - old.last_activity_at >= self.idle_timeout => {
                debug!(session_id = %old.session_id, "session idled out; rotating");
                let ended = EndedSession {
                    session_id: old.session_id,
                    last_activity_at: old.last_activity_at,
                };
                let session = self.start_session(now);
                SessionOutcome::Rotated { ended, session }
            }
            Some(mut session) => {
                session.last_activity_at = now;
                self.persist(&session);
                self.current = Some(session.clone());
                SessionOutcome::Continued { session }
            }
        }
    }

    /// The current session id, if a session has been established.
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.session_id.clone())
    }

    /// Whether session state fell back to memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn start_session(&mut self, now: DateTime<Utc>) -> Session {
        let session = Session {
            session_id: SessionId::new(),
            started_at: now,
            last_activity_at: now,
        };
        self.persist(&session);
        self.current = Some(session.clone());
        session
    }

    fn persist(&mut self, session: &Session) {
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "could not serialize session");
                return;
            }
        };
        if let Err(e) = self.ephemeral.set(SESSION_KEY, &raw) {
            if !self.degraded {
                warn!(error = %e, "could not persist session; continuing in memory");
            }
            self.degraded = true;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
