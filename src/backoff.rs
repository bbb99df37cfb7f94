//! Exponential backoff schedule for blocking reads.
//!
//! Blocking reads never park on a condition variable; they spin with a
//! timed sleep that grows exponentially up to a cap. Callers depend on
//! this latency profile under light load, so the schedule is fixed and
//! visible rather than tunable.

use std::time::Duration;

/// First sleep interval of a blocking read.
pub const INIT_SLEEP: Duration = Duration::from_micros(1);

/// Upper bound on a single sleep interval.
pub const MAX_SLEEP: Duration = Duration::from_micros(5000);

/// Multiplier applied after each failed poll attempt.
pub const EXP_BASE: u32 = 2;

/// Exponential backoff state.
///
/// [`next_interval`](Backoff::next_interval) is split from the actual
/// sleeping so the schedule can be driven (and tested) without waiting.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    /// Start a fresh schedule at [`INIT_SLEEP`].
    pub fn new() -> Self {
        Self {
            current: INIT_SLEEP,
        }
    }

    /// Interval to sleep for the current attempt; grows the schedule for
    /// the next one.
    pub fn next_interval(&mut self) -> Duration {
        let interval = self.current;
        if self.current < MAX_SLEEP {
            self.current = (self.current * EXP_BASE).min(MAX_SLEEP);
        }
        interval
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_starts_at_init() {
        let mut b = Backoff::new();
        assert_eq!(b.next_interval(), INIT_SLEEP);
    }

    #[test]
    fn test_schedule_doubles_until_cap() {
        let mut b = Backoff::new();
        let mut prev = b.next_interval();
        loop {
            let next = b.next_interval();
            if next == MAX_SLEEP {
                break;
            }
            assert_eq!(next, prev * EXP_BASE);
            prev = next;
        }
    }

    #[test]
    fn test_schedule_caps_and_stays_capped() {
        let mut b = Backoff::new();
        for _ in 0..64 {
            assert!(b.next_interval() <= MAX_SLEEP);
        }
        assert_eq!(b.next_interval(), MAX_SLEEP);
        assert_eq!(b.next_interval(), MAX_SLEEP);
    }
}
