use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::BidTime;

/// Source of bid timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> BidTime;
}

/// Wall-clock nanoseconds, strictly increasing per instance.
///
/// Two calls never return the same value, even when the system clock has
/// coarse resolution or steps backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> BidTime {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(wall.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        wall.max(prev.saturating_add(1))
    }
}

/// Deterministic clock for tests and simulations: returns the current value
/// and advances by one tick.
#[derive(Debug)]
pub struct ManualClock {
    next: AtomicI64,
}

impl ManualClock {
    pub fn new(start: BidTime) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    pub fn set(&self, value: BidTime) {
        self.next.store(value, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: i64) {
        self.next.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn peek(&self) -> BidTime {
        self.next.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> BidTime {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn manual_clock_ticks() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now(), 100);
        assert_eq!(clock.now(), 101);
        clock.set(500);
        assert_eq!(clock.peek(), 500);
        clock.advance(10);
        assert_eq!(clock.now(), 510);
    }
}
