//! Funnel attempt tracking.
//!
//! A named multi-step process (`idle → started → submitted → succeeded |
//! abandoned`) scoped to an attempt, which is itself scoped to a session.
//! The tracker returns a [`FunnelTransition`] describing which event, if
//! any, the caller should emit; flag guards make every operation
//! idempotent, and terminal transitions destroy the attempt so a later
//! unload cannot misfire abandonment.
//!
//! The attempt is persisted to ephemeral storage, surviving a reload
//! within the session. An attempt owned by a different session is stale
//! and silently replaced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use hearth_core::{AttemptId, SessionId};
use hearth_storage::KeyValueStorage;

/// Monotonic per-attempt step flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFlags {
    /// The funnel was entered.
    pub started: bool,
    /// The form was submitted.
    pub submitted: bool,
    /// The submission was confirmed.
    pub succeeded: bool,
    /// The attempt was abandoned before success.
    pub abandoned: bool,
}

/// One live attempt at a funnel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelAttempt {
    /// Attempt identifier, tagged onto every funnel event.
    pub attempt_id: AttemptId,
    /// Session that owns the attempt.
    pub owning_session_id: SessionId,
    /// Step flags.
    pub flags: AttemptFlags,
}

impl FunnelAttempt {
    fn fresh(session: SessionId) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            owning_session_id: session,
            flags: AttemptFlags::default(),
        }
    }
}

/// What a funnel operation decided; the caller emits the matching event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunnelTransition {
    /// The attempt entered `started`.
    Started {
        /// The attempt.
        attempt_id: AttemptId,
    },
    /// The attempt entered `submitted`.
    Submitted {
        /// The attempt.
        attempt_id: AttemptId,
    },
    /// The attempt completed; it no longer exists.
    Succeeded {
        /// The destroyed attempt.
        attempt_id: AttemptId,
    },
    /// The attempt was abandoned; it no longer exists.
    Abandoned {
        /// The destroyed attempt.
        attempt_id: AttemptId,
    },
    /// Nothing to emit (guarded repeat, or no applicable attempt).
    NoChange,
}

/// Tracks one named funnel to completion or abandonment.
pub struct FunnelTracker {
    name: String,
    ephemeral: Arc<dyn KeyValueStorage>,
    attempt: Option<FunnelAttempt>,
    degraded: bool,
}

impl FunnelTracker {
    /// Create a tracker for `name`, resuming any persisted attempt.
    pub fn new(name: impl Into<String>, ephemeral: Arc<dyn KeyValueStorage>) -> Self {
        let name = name.into();
        let key = attempt_key(&name);
        let mut degraded = false;
        let attempt = match ephemeral.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<FunnelAttempt>(&raw) {
                Ok(attempt) => Some(attempt),
                Err(e) => {
                    warn!(error = %e, funnel = %name, "discarding unreadable persisted attempt");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, funnel = %name, "ephemeral storage unavailable; attempt state is in-memory only");
                degraded = true;
                None
            }
        };

        Self {
            name,
            ephemeral,
            attempt,
            degraded,
        }
    }

    /// Make sure an attempt owned by `session` exists, without emitting.
    pub fn ensure_attempt(&mut self, session: &SessionId) -> AttemptId {
        self.drop_stale(session);
        if let Some(attempt) = &self.attempt {
            return attempt.attempt_id.clone();
        }
        let attempt = FunnelAttempt::fresh(session.clone());
        let id = attempt.attempt_id.clone();
        self.attempt = Some(attempt);
        self.persist();
        id
    }

    /// Enter `started`. Idempotent while already started.
    pub fn start(&mut self, session: &SessionId) -> FunnelTransition {
        self.drop_stale(session);
        if let Some(attempt) = &self.attempt {
            if attempt.flags.started {
                return FunnelTransition::NoChange;
            }
        }

        let mut attempt = self
            .attempt
            .take()
            .unwrap_or_else(|| FunnelAttempt::fresh(session.clone()));
        attempt.flags.started = true;
        attempt.flags.succeeded = false;
        attempt.flags.abandoned = false;
        let id = attempt.attempt_id.clone();
        self.attempt = Some(attempt);
        self.persist();
        FunnelTransition::Started { attempt_id: id }
    }

    /// Enter `submitted`. Requires an attempt; idempotent.
    pub fn submit(&mut self, session: &SessionId) -> FunnelTransition {
        self.drop_stale(session);
        let Some(attempt) = self.attempt.as_mut() else {
            return FunnelTransition::NoChange;
        };
        if attempt.flags.submitted {
            return FunnelTransition::NoChange;
        }
        attempt.flags.submitted = true;
        let id = attempt.attempt_id.clone();
        self.persist();
        FunnelTransition::Submitted { attempt_id: id }
    }

    /// Complete the attempt and destroy it.
    pub fn success(&mut self, session: &SessionId) -> FunnelTransition {
        self.drop_stale(session);
        let Some(attempt) = &self.attempt else {
            return FunnelTransition::NoChange;
        };
        if attempt.flags.succeeded {
            return FunnelTransition::NoChange;
        }
        let id = attempt.attempt_id.clone();
        self.discard();
        FunnelTransition::Succeeded { attempt_id: id }
    }

    /// Abandon the attempt and destroy it.
    ///
    /// Fires only for a started, non-succeeded, non-abandoned attempt, so
    /// redundant teardown signals emit at most once.
    pub fn abandon(&mut self, session: &SessionId) -> FunnelTransition {
        self.drop_stale(session);
        let Some(attempt) = &self.attempt else {
            return FunnelTransition::NoChange;
        };
        if !attempt.flags.started || attempt.flags.succeeded || attempt.flags.abandoned {
            return FunnelTransition::NoChange;
        }
        let id = attempt.attempt_id.clone();
        self.discard();
        FunnelTransition::Abandoned { attempt_id: id }
    }

    /// Drop any attempt (on session rotation).
    pub fn clear(&mut self) {
        self.discard();
    }

    /// The live attempt id, if any.
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt.as_ref().map(|a| a.attempt_id.clone())
    }

    /// Whether attempt state fell back to memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn drop_stale(&mut self, session: &SessionId) {
        let stale = self
            .attempt
            .as_ref()
            .is_some_and(|a| a.owning_session_id != *session);
        if stale {
            self.discard();
        }
    }

    fn discard(&mut self) {
        self.attempt = None;
        if let Err(e) = self.ephemeral.remove(&attempt_key(&self.name)) {
            if !self.degraded {
                warn!(error = %e, funnel = %self.name, "could not clear persisted attempt");
            }
            self.degraded = true;
        }
    }

    fn persist(&mut self) {
        let Some(attempt) = &self.attempt else {
            return;
        };
        let raw = match serde_json::to_string(attempt) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, funnel = %self.name, "could not serialize attempt");
                return;
            }
        };
        if let Err(e) = self.ephemeral.set(&attempt_key(&self.name), &raw) {
            if !self.degraded {
                warn!(error = %e, funnel = %self.name, "could not persist attempt; continuing in memory");
            }
            self.degraded = true;
        }
    }
}

fn attempt_key(name: &str) -> String {
    format!("hearth.funnel:{name}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
