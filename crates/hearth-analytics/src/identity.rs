//! Visitor identity.
//!
//! One durable anonymous identifier per browser profile, created lazily on
//! first access and never destroyed by the client. When durable storage is
//! denied, a fresh value serves the rest of the page load in memory;
//! every later start generates a new one until storage recovers.
//!
//! The authenticated user binding is purely in-memory; the auth
//! collaborator re-derives it on every page load.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use hearth_core::{AnonymousId, UserId};
use hearth_storage::KeyValueStorage;

/// Durable-storage key holding the anonymous identifier.
const ANON_ID_KEY: &str = "hearth.anon_id";

#[derive(Debug, Default)]
struct IdentityState {
    anon: Option<AnonymousId>,
    user: Option<UserId>,
    degraded: bool,
}

/// Creates and persists the anonymous identifier; tracks the signed-in user.
pub struct IdentityStore {
    durable: Arc<dyn KeyValueStorage>,
    state: Mutex<IdentityState>,
}

impl IdentityStore {
    /// Create a store over the given durable storage.
    pub fn new(durable: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            durable,
            state: Mutex::new(IdentityState::default()),
        }
    }

    /// The anonymous identifier, creating and persisting one if absent.
    ///
    /// Never fails visibly: on storage failure the value is generated for
    /// in-memory use only and the store is marked degraded.
    pub fn anonymous_id(&self) -> AnonymousId {
        let mut state = self.state.lock();
        if let Some(id) = &state.anon {
            return id.clone();
        }

        let id = match self.durable.get(ANON_ID_KEY) {
            Ok(Some(existing)) => AnonymousId::from_string(existing),
            Ok(None) => {
                let fresh = AnonymousId::new();
                if let Err(e) = self.durable.set(ANON_ID_KEY, fresh.as_str()) {
                    warn!(error = %e, "could not persist anonymous id; using in-memory value");
                    state.degraded = true;
                }
                fresh
            }
            Err(e) => {
                warn!(error = %e, "durable storage unavailable; using in-memory anonymous id");
                state.degraded = true;
                AnonymousId::new()
            }
        };

        state.anon = Some(id.clone());
        id
    }

    /// Bind or clear the authenticated principal.
    pub fn set_user_id(&self, user: Option<UserId>) {
        self.state.lock().user = user;
    }

    /// The currently bound principal, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.state.lock().user.clone()
    }

    /// Whether the store fell back to an in-memory identifier.
    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
