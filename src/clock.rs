//! Wall-clock abstraction for assigning epoch-second timestamps.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of epoch-second timestamps for readings and predictions.
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> i64;
}

/// Real-time clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// `step` seconds are added after every read, so a step of 0 keeps the
/// clock frozen and a step of 1 hands out consecutive seconds.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
    step: i64,
}

impl ManualClock {
    pub fn frozen(at: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(at)),
            step: 0,
        }
    }

    pub fn ticking(start: i64, step: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
            step,
        }
    }

    pub fn set(&self, at: i64) {
        self.now.store(at, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_clock_does_not_move() {
        let clock = ManualClock::frozen(100);
        assert_eq!(clock.now_epoch(), 100);
        assert_eq!(clock.now_epoch(), 100);
        clock.advance(5);
        assert_eq!(clock.now_epoch(), 105);
    }

    #[test]
    fn test_ticking_clock_hands_out_consecutive_seconds() {
        let clock = ManualClock::ticking(10, 1);
        assert_eq!(clock.now_epoch(), 10);
        assert_eq!(clock.now_epoch(), 11);
        clock.set(50);
        assert_eq!(clock.now_epoch(), 50);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_epoch() > 1_577_836_800);
    }
}
