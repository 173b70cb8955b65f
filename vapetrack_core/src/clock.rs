//! Wall-clock access.
//!
//! All code reads "now" through a [`Clock`] so day rollover can be tested.
//! Times are returned with the local UTC offset; calendar-day logic uses
//! that offset.

use chrono::{DateTime, Duration, FixedOffset, Local, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// The host clock in the host's local timezone
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the store.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Parse an RFC 3339 timestamp, panicking on bad input (test helper)
    pub fn at(rfc3339: &str) -> Self {
        Self::new(DateTime::parse_from_rfc3339(rfc3339).expect("valid RFC 3339 timestamp"))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::at("2025-03-10T23:30:00+02:00");
        let handle = clock.clone();

        handle.advance(Duration::hours(1));

        assert_eq!(clock.now().to_rfc3339(), "2025-03-11T00:30:00+02:00");
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-03-10T22:30:00+00:00");
    }
}
