//! Injectable time source.
//!
//! Idle-timeout expiry and retry backoff both compare wall-clock
//! timestamps. [`Clock`] is the seam that lets tests drive those
//! comparisons without real waits: production code takes an
//! `Arc<dyn Clock>` and the tests hand it a [`ManualClock`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A source of the current UTC time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock whose time only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock pinned at the given instant.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_holds_still() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        clock.advance(Duration::minutes(31));
        assert_eq!(clock.now(), start + Duration::minutes(31));
    }

    #[test]
    fn manual_clock_set_jumps() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        let view = clock.clone();
        clock.advance(Duration::seconds(5));
        assert_eq!(view.now(), start + Duration::seconds(5));
    }
}
