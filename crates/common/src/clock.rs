use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Source of the current UTC time.
///
/// Every audit stamp, soft-delete timestamp and event occurrence time is
/// taken from an injected clock so tests can pin time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Truncates `instant` to whole microseconds, the precision PostgreSQL keeps.
///
/// Stamps at finer precision would compare differently once stored.
pub fn storage_precision(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(6)
}

/// Wall-clock time at microsecond precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        storage_precision(Utc::now())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`, truncated to microseconds.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(storage_precision(now))),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = storage_precision(now);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = storage_precision(*guard + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_is_frozen_until_moved() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));

        let later = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn clocks_stamp_whole_microseconds() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start + Duration::nanoseconds(123_456_789));
        assert_eq!(clock.now(), start + Duration::microseconds(123_456));

        clock.advance(Duration::nanoseconds(999));
        assert_eq!(clock.now(), start + Duration::microseconds(123_456));

        assert_eq!(SystemClock.now().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn fixed_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        let other = clock.clone();
        clock.advance(Duration::seconds(30));
        assert_eq!(other.now(), start + Duration::seconds(30));
    }
}
