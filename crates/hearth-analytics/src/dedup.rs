//! Session-scoped dedup flags.
//!
//! A flag keyed `(session, kind, entity)` records that a guarded event
//! already fired this session. The in-memory set is authoritative for this
//! page load; ephemeral storage carries the flags across a reload within
//! the same session. [`DedupStore::check_and_set`] sets the flag *before*
//! the event is enqueued, closing the race where two near-simultaneous
//! observations both see "unset".

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use hearth_core::SessionId;
use hearth_storage::KeyValueStorage;

/// Ephemeral-storage key prefix for dedup flags.
const FLAG_PREFIX: &str = "hearth.dedup:";

#[derive(Debug, Default)]
struct DedupState {
    seen: HashSet<String>,
    degraded: bool,
}

/// Records which (kind, entity) pairs already emitted this session.
pub struct DedupStore {
    ephemeral: Arc<dyn KeyValueStorage>,
    state: Mutex<DedupState>,
}

impl DedupStore {
    /// Create a store over the given ephemeral storage.
    pub fn new(ephemeral: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            ephemeral,
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Whether the flag for `(session, kind, entity)` is set.
    pub fn has_flag(&self, session: &SessionId, kind: &str, entity: &str) -> bool {
        let key = flag_key(session, kind, entity);
        let mut state = self.state.lock();
        if state.seen.contains(&key) {
            return true;
        }
        match self.ephemeral.get(&key) {
            Ok(Some(_)) => {
                let _ = state.seen.insert(key);
                true
            }
            Ok(None) => false,
            Err(e) => {
                if !state.degraded {
                    warn!(error = %e, "dedup storage unavailable; flags are in-memory only");
                }
                state.degraded = true;
                false
            }
        }
    }

    /// Set the flag for `(session, kind, entity)`.
    pub fn set_flag(&self, session: &SessionId, kind: &str, entity: &str) {
        let key = flag_key(session, kind, entity);
        let mut state = self.state.lock();
        let _ = state.seen.insert(key.clone());
        if let Err(e) = self.ephemeral.set(&key, "1") {
            if !state.degraded {
                warn!(error = %e, "dedup storage unavailable; flags are in-memory only");
            }
            state.degraded = true;
        }
    }

    /// Atomically check the flag and set it when unset.
    ///
    /// Returns `true` exactly once per `(session, kind, entity)`: the call
    /// that should emit the guarded event.
    pub fn check_and_set(&self, session: &SessionId, kind: &str, entity: &str) -> bool {
        if self.has_flag(session, kind, entity) {
            return false;
        }
        self.set_flag(session, kind, entity);
        true
    }

    /// Clear one flag.
    pub fn clear_flag(&self, session: &SessionId, kind: &str, entity: &str) {
        let key = flag_key(session, kind, entity);
        let mut state = self.state.lock();
        let _ = state.seen.remove(&key);
        if let Err(e) = self.ephemeral.remove(&key) {
            state.degraded = true;
            warn!(error = %e, "could not clear dedup flag");
        }
    }

    /// Clear every flag belonging to `session` (on rotation).
    pub fn clear_session(&self, session: &SessionId) {
        let prefix = session_prefix(session);
        let mut state = self.state.lock();
        state.seen.retain(|k| !k.starts_with(&prefix));

        match self.ephemeral.keys_with_prefix(&prefix) {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.ephemeral.remove(&key) {
                        state.degraded = true;
                        warn!(error = %e, "could not clear dedup flag");
                        break;
                    }
                }
            }
            Err(e) => {
                if !state.degraded {
                    warn!(error = %e, "could not enumerate dedup flags for clearing");
                }
                state.degraded = true;
            }
        }
    }

    /// Whether flags fell back to memory only.
    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }
}

fn session_prefix(session: &SessionId) -> String {
    format!("{FLAG_PREFIX}{session}:")
}

fn flag_key(session: &SessionId, kind: &str, entity: &str) -> String {
    format!("{FLAG_PREFIX}{session}:{kind}:{entity}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
