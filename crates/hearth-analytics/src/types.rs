//! Shared pipeline types.

use hearth_core::SessionId;

/// How a tracker call was handled.
///
/// Tracker calls never fail; this status exists for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackStatus {
    /// The event was enqueued normally.
    Tracked,
    /// The event was enqueued, but some state is running on the in-memory
    /// fallback because client storage is unavailable.
    Degraded,
    /// A dedup guard had already fired for this (kind, entity) pair this
    /// session; nothing was enqueued.
    Deduplicated,
    /// The call did not apply (no funnel attempt, empty filtered batch,
    /// or unserializable props); nothing was enqueued.
    Skipped,
}

/// A passive user-activity signal that renews the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    /// Pointer moved or clicked.
    Pointer,
    /// A key was pressed.
    Key,
    /// The page scrolled.
    Scroll,
    /// The tab became visible again.
    VisibilityVisible,
}

impl ActivityKind {
    /// Stable label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pointer => "pointer",
            Self::Key => "key",
            Self::Scroll => "scroll",
            Self::VisibilityVisible => "visibility_visible",
        }
    }
}

/// Snapshot of pipeline health for diagnostics surfaces and tests.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    /// Events waiting for delivery.
    pub queue_depth: usize,
    /// Consecutive failed flushes since the last success.
    pub consecutive_failures: u32,
    /// Whether any component fell back to in-memory state.
    pub storage_degraded: bool,
    /// The current session, if one has been established.
    pub session_id: Option<SessionId>,
    /// Whether an authenticated principal is bound.
    pub user_bound: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
