//! PulseSync: fixed root, rapid flooding via randomized per-hop retransmit
//! delay instead of periodic beaconing from every node.
//!
//! Grounded on `examples/original_source/sys/net/clocksync/pulsesync/pulsesync.c`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::beacon::{DispatchMarker, TreeBeacon};
use crate::config::PulseSyncConfig;
use crate::error::CodecError;
use crate::estimator::linear_regression;
use crate::frame_sink::FrameSink;
use crate::gtimer::{LogicalClock, TimeVal};
use crate::hardware_clock::HardwareClock;
use crate::root_election::PREFERRED_ROOT;
use crate::status::SyncStatus;
use crate::sync_table::SyncTable;

struct Inner {
    table: SyncTable,
    root_id: u16,
    seq: u16,
}

pub struct PulseSyncEngine<H: HardwareClock> {
    node_id: u16,
    clock: Arc<LogicalClock<H>>,
    sink: Arc<dyn FrameSink>,
    config: Mutex<PulseSyncConfig>,
    inner: Mutex<Inner>,
    status: Arc<RwLock<SyncStatus>>,
    paused: AtomicBool,
}

impl<H: HardwareClock> PulseSyncEngine<H> {
    pub fn new(
        node_id: u16,
        clock: Arc<LogicalClock<H>>,
        sink: Arc<dyn FrameSink>,
        config: PulseSyncConfig,
        status: Arc<RwLock<SyncStatus>>,
    ) -> Arc<Self> {
        Arc::new(PulseSyncEngine {
            node_id,
            clock,
            sink,
            config: Mutex::new(config),
            inner: Mutex::new(Inner { table: SyncTable::new(), root_id: PREFERRED_ROOT, seq: 0 }),
            status,
            paused: AtomicBool::new(true),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.table.clear();
        inner.root_id = PREFERRED_ROOT;
        inner.seq = 0;
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn set_beacon_delay(&self, secs: u64) {
        self.config.lock().unwrap().beacon_interval_secs = secs;
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.config.lock().unwrap().beacon_interval_secs)
    }

    pub fn is_synced(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let cfg = self.config.lock().unwrap();
        inner.table.len() >= cfg.entry_valid_limit || self.is_root()
    }

    pub fn is_root(&self) -> bool {
        self.node_id == PREFERRED_ROOT
    }

    fn publish_status(&self, inner: &Inner, offset_us: i64) {
        let mut status = self.status.write().unwrap();
        status.is_synced = inner.table.len() >= 4 || self.is_root();
        status.root_id = Some(inner.root_id);
        status.table_entries = inner.table.len();
        status.last_offset_us = offset_us;
        status.relative_rate_ppm = self.clock.relative_rate() * 1_000_000.0;
        status.updated_local_us = self.clock.now().local;
    }

    /// The root's own periodic beacon; non-root nodes never call this —
    /// they flood on receipt instead (see [`Self::mac_read`]).
    pub fn tick(&self, transmission_delay_us: u64) {
        if self.paused.load(Ordering::SeqCst) || !self.is_root() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.seq += 1;
        self.send_beacon(&inner, transmission_delay_us);
        self.publish_status(&inner, 0);
    }

    fn send_beacon(&self, inner: &Inner, transmission_delay_us: u64) {
        let now = self.clock.now();
        let beacon = TreeBeacon {
            id: self.node_id,
            root: inner.root_id,
            seq_number: inner.seq,
            global: now.global + transmission_delay_us as i64,
        };
        let mut buf = Vec::with_capacity(crate::beacon::TREE_BEACON_LEN);
        beacon.encode(DispatchMarker::PulseSync, &mut buf);
        if let Err(e) = self.sink.send_broadcast(&buf) {
            warn!("pulsesync[{}]: failed to send beacon: {e}", self.node_id);
        }
    }

    /// Returns `Some(delay)` when the node should schedule its own
    /// retransmission after `delay`, matching the random propagation delay
    /// in the source (`1000 + rand() % jitter` microseconds).
    pub fn mac_read(&self, payload: &[u8], toa: TimeVal) -> Result<Option<Duration>, CodecError> {
        if self.paused.load(Ordering::SeqCst) || self.is_root() {
            return Ok(None);
        }
        let beacon = TreeBeacon::decode(payload)?;

        let mut inner = self.inner.lock().unwrap();
        if inner.root_id != beacon.root || beacon.seq_number <= inner.seq {
            return Ok(None);
        }
        inner.seq = beacon.seq_number;

        let currently_synced = inner.table.len() >= self.config.lock().unwrap().entry_valid_limit;
        let outcome = inner.table.insert(toa.local, beacon.global, toa.global, currently_synced);

        let fit = linear_regression(inner.table.iter());
        let est_global = fit.offset.wrapping_add((toa.local as f64 * fit.rate) as i64);
        let offset_global = est_global.wrapping_sub(toa.global);

        let cfg = self.config.lock().unwrap();
        let sane_limit = if currently_synced { cfg.sane_offset_synced_us } else { cfg.sane_offset_unsynced_us };
        if offset_global.unsigned_abs() > sane_limit as u64 {
            warn!(
                "pulsesync[{}]: rejecting insane offset {offset_global}us (limit {sane_limit}us)",
                self.node_id
            );
            inner.table.clear();
            self.publish_status(&inner, offset_global);
            return Ok(None);
        }

        self.clock.set_global_offset(offset_global);
        if outcome.table_entries >= cfg.rate_calc_threshold {
            self.clock.set_relative_rate(fit.rate - 1.0);
        }
        info!(
            "pulsesync[{}]: flooding beacon seq={}, table_entries={}",
            self.node_id, beacon.seq_number, outcome.table_entries
        );
        self.publish_status(&inner, offset_global);

        let delay_us = 1_000 + rand::rng().random_range(0..cfg.propagation_delay_jitter_us.max(1));
        Ok(Some(Duration::from_micros(delay_us)))
    }

    /// Fired by the node after the random propagation delay returned from
    /// [`Self::mac_read`] elapses: relay the flood onward.
    pub fn send_relay(&self, transmission_delay_us: u64) {
        let inner = self.inner.lock().unwrap();
        self.send_beacon(&inner, transmission_delay_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_sink::MockFrameSink;
    use crate::hardware_clock::MockHardwareClock;

    fn engine(node_id: u16) -> Arc<PulseSyncEngine<MockHardwareClock>> {
        let mut hw = MockHardwareClock::new();
        hw.expect_now_us().returning(|| 0);
        let clock = LogicalClock::new(hw);
        let mut sink = MockFrameSink::new();
        sink.expect_send_broadcast().returning(|_| Ok(()));
        PulseSyncEngine::new(
            node_id,
            clock,
            Arc::new(sink),
            PulseSyncConfig::default(),
            Arc::new(RwLock::new(SyncStatus::default())),
        )
    }

    #[test]
    fn root_never_accepts_beacons() {
        let engine = engine(PREFERRED_ROOT);
        engine.resume();
        let mut buf = Vec::new();
        TreeBeacon { id: 2, root: 1, seq_number: 5, global: 1_000 }
            .encode(DispatchMarker::PulseSync, &mut buf);
        let result = engine.mac_read(&buf, TimeVal { local: 0, global: 0, rate: 0.0 }).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn non_root_floods_with_random_delay_on_new_seq() {
        let engine = engine(2);
        engine.resume();
        let mut buf = Vec::new();
        TreeBeacon { id: 1, root: 1, seq_number: 1, global: 1_000 }
            .encode(DispatchMarker::PulseSync, &mut buf);
        let delay = engine.mac_read(&buf, TimeVal { local: 0, global: 0, rate: 0.0 }).unwrap();
        assert!(delay.is_some());
        assert!(delay.unwrap() >= Duration::from_micros(1_000));
    }

    #[test]
    fn duplicate_sequence_is_dropped() {
        let engine = engine(2);
        engine.resume();
        let mut buf = Vec::new();
        TreeBeacon { id: 1, root: 1, seq_number: 1, global: 1_000 }
            .encode(DispatchMarker::PulseSync, &mut buf);
        engine.mac_read(&buf, TimeVal { local: 0, global: 0, rate: 0.0 }).unwrap();
        let second = engine.mac_read(&buf, TimeVal { local: 1, global: 1, rate: 0.0 }).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn insane_offset_clears_table() {
        let engine = engine(5);
        engine.resume();
        // Bring the node to a synced state first, so the tight 1s sanity
        // limit (rather than the 1-year unsynced one) applies.
        for i in 0..5u16 {
            let mut buf = Vec::new();
            TreeBeacon { id: 1, root: 1, seq_number: i + 1, global: (i as i64) * 1_000_000 }
                .encode(DispatchMarker::PulseSync, &mut buf);
            let toa = TimeVal { local: (i as u64) * 1_000_000, global: (i as i64) * 1_000_000, rate: 0.0 };
            engine.mac_read(&buf, toa).unwrap();
        }
        assert!(engine.is_synced());

        let mut buf = Vec::new();
        TreeBeacon { id: 1, root: 1, seq_number: 6, global: 5_000_000_000 }
            .encode(DispatchMarker::PulseSync, &mut buf);
        let result = engine.mac_read(&buf, TimeVal { local: 5_000_000, global: 5_000_000, rate: 0.0 }).unwrap();
        assert!(result.is_none());
        assert_eq!(engine.inner.lock().unwrap().table.len(), 0);
    }
}
