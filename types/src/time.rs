//! Timestamps and the clock abstraction.
//!
//! Timestamps are Unix epoch seconds (UTC). Every expiry decision in the engine
//! reads the time from a [`Clock`] so tests can drive it deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    ///
    /// A system clock set before the epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// This timestamp moved forward by `secs`, saturating at `u64::MAX`.
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Seconds left until this timestamp is reached (zero once passed).
    pub fn remaining_from(&self, now: Timestamp) -> u64 {
        self.0.saturating_sub(now.0)
    }

    /// Whether this timestamp, read as a deadline, has passed relative to `now`.
    ///
    /// The deadline itself counts as passed.
    pub fn is_reached(&self, now: Timestamp) -> bool {
        now.0 >= self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_reached_at_and_after() {
        let deadline = Timestamp::new(100);
        assert!(!deadline.is_reached(Timestamp::new(99)));
        assert!(deadline.is_reached(Timestamp::new(100)));
        assert!(deadline.is_reached(Timestamp::new(101)));
    }

    #[test]
    fn plus_secs_saturates() {
        let ts = Timestamp::new(u64::MAX - 1);
        assert_eq!(ts.plus_secs(10).as_secs(), u64::MAX);
    }

    #[test]
    fn remaining_is_zero_once_passed() {
        let deadline = Timestamp::new(50);
        assert_eq!(deadline.remaining_from(Timestamp::new(20)), 30);
        assert_eq!(deadline.remaining_from(Timestamp::new(80)), 0);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > Timestamp::EPOCH);
    }
}
