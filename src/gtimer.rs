//! The logical clock ("gtimer"): an affine mapping from the node's monotonic
//! hardware counter to the network's agreed global time.
//!
//! `global = local + offset + rate * local`, where `rate` is stored as the
//! deviation from unity (0.0 means "no drift"). Protocols never overwrite
//! `global` directly; they push corrections through [`LogicalClock::set_global_offset`]
//! and [`LogicalClock::set_relative_rate`], which keeps `global` a pure
//! function of the ever-monotonic hardware reading.

use std::sync::{Arc, Mutex};

use crate::hardware_clock::HardwareClock;

/// A snapshot of the logical clock at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeVal {
    pub local: u64,
    pub global: i64,
    pub rate: f64,
}

struct Inner {
    offset: i64,
    rate: f64,
}

/// Thread-safe logical clock shared by every protocol engine on a node.
///
/// The hardware counter is read lock-free; `offset`/`rate` are guarded by a
/// single mutex so `now()` observes a consistent pair.
pub struct LogicalClock<H: HardwareClock> {
    hw: H,
    inner: Mutex<Inner>,
}

impl<H: HardwareClock> LogicalClock<H> {
    pub fn new(hw: H) -> Arc<Self> {
        Arc::new(LogicalClock {
            hw,
            inner: Mutex::new(Inner { offset: 0, rate: 0.0 }),
        })
    }

    /// Snapshot the clock: hardware reading plus the current correction.
    pub fn now(&self) -> TimeVal {
        let local = self.hw.now_us();
        let inner = self.inner.lock().unwrap();
        let global = (local as i64).wrapping_add(inner.offset).wrapping_add((local as f64 * inner.rate) as i64);
        TimeVal { local, global, rate: inner.rate }
    }

    /// Apply an additive correction to the global offset.
    pub fn set_global_offset(&self, delta: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.offset = inner.offset.wrapping_add(delta);
    }

    /// Replace the relative rate correction (delta from unity).
    pub fn set_relative_rate(&self, rate: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.rate = rate;
    }

    pub fn relative_rate(&self) -> f64 {
        self.inner.lock().unwrap().rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware_clock::MockHardwareClock;

    #[test]
    fn now_reflects_offset_and_rate() {
        let mut hw = MockHardwareClock::new();
        hw.expect_now_us().returning(|| 1_000_000);
        let clock = LogicalClock::new(hw);

        let t0 = clock.now();
        assert_eq!(t0.global, 1_000_000);

        clock.set_global_offset(500);
        let t1 = clock.now();
        assert_eq!(t1.global, 1_000_500);

        clock.set_relative_rate(0.001);
        let t2 = clock.now();
        assert_eq!(t2.global, 1_000_500 + 1000);
    }

    #[test]
    fn offsets_accumulate() {
        let mut hw = MockHardwareClock::new();
        hw.expect_now_us().returning(|| 0);
        let clock = LogicalClock::new(hw);

        clock.set_global_offset(10);
        clock.set_global_offset(-3);
        assert_eq!(clock.now().global, 7);
    }
}
