//! Independent observer that emits grep-able `#eh`/`#et` lines describing
//! this node's logical clock, matching
//! `examples/original_source/sys/net/clocksync/clocksync_eval/clocksync_eval.c`.
//! Hardware-statistics fields (`pi`/`po`/`cr`/`s`) are transceiver-specific
//! and out of scope here, so they are simply omitted — the same thing the
//! original does when `MODULE_CC110X_NG` isn't compiled in.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::info;

use crate::beacon::EvalBeacon;
use crate::frame_sink::FrameSink;
use crate::gtimer::LogicalClock;
use crate::hardware_clock::HardwareClock;

pub struct EvalPrinter<H: HardwareClock> {
    node_id: u16,
    clock: Arc<LogicalClock<H>>,
    sink: Arc<dyn FrameSink>,
    counter: AtomicU32,
}

impl<H: HardwareClock> EvalPrinter<H> {
    pub fn new(node_id: u16, clock: Arc<LogicalClock<H>>, sink: Arc<dyn FrameSink>) -> Self {
        EvalPrinter { node_id, clock, sink, counter: AtomicU32::new(0) }
    }

    /// Send this node's own periodic eval beacon (for round-trip timing
    /// measurement by a third party) and log a heartbeat line.
    pub fn heartbeat(&self) {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let beacon = EvalBeacon { counter };
        let mut buf = Vec::with_capacity(crate::beacon::EVAL_BEACON_LEN);
        beacon.encode(&mut buf);
        let _ = self.sink.send_broadcast(&buf);

        let now = self.clock.now();
        info!(
            "#eh, a: {}, c: {}, gl: {}, gg: {}, gr: {}",
            self.node_id,
            counter,
            now.local,
            now.global,
            (now.rate * 1_000_000_000.0) as i64
        );
    }

    /// Log the `#et` line for a received eval beacon.
    pub fn on_received(&self, payload: &[u8], src: u16, toa_local: u64, toa_global: i64) {
        if let Ok(beacon) = EvalBeacon::decode(payload) {
            info!("#et, a: {src}, c: {}, tl: {toa_local}, tg: {toa_global}", beacon.counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_sink::MockFrameSink;
    use crate::hardware_clock::MockHardwareClock;

    #[test]
    fn heartbeat_increments_counter_and_sends_a_beacon() {
        let mut hw = MockHardwareClock::new();
        hw.expect_now_us().returning(|| 42);
        let clock = LogicalClock::new(hw);
        let mut sink = MockFrameSink::new();
        sink.expect_send_broadcast().times(2).returning(|_| Ok(()));
        let printer = EvalPrinter::new(1, clock, Arc::new(sink));

        printer.heartbeat();
        printer.heartbeat();
        assert_eq!(printer.counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn malformed_received_beacon_is_ignored_not_panicking() {
        let mut hw = MockHardwareClock::new();
        hw.expect_now_us().returning(|| 0);
        let clock = LogicalClock::new(hw);
        let printer = EvalPrinter::new(1, clock, Arc::new(MockFrameSink::new()));
        printer.on_received(&[0x99, 1], 2, 0, 0);
    }
}
