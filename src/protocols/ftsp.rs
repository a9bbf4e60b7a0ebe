//! FTSP: tree-based, root-elected, linear-regression synchronization.
//!
//! Grounded on `examples/original_source/sys/net/clocksync/ftsp/ftsp.c` for
//! root election, and on `pulsesync.c`'s `add_new_entry`/`linear_regression`
//! for the sync-table/regression receive path (the distilled spec models
//! FTSP's table bookkeeping on PulseSync's, not on the older ring-buffer FTSP
//! variant also present under `original_source/`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{debug, info, warn};

use crate::beacon::{DispatchMarker, TreeBeacon};
use crate::config::FtspConfig;
use crate::error::CodecError;
use crate::estimator::linear_regression;
use crate::frame_sink::FrameSink;
use crate::gtimer::{LogicalClock, TimeVal};
use crate::hardware_clock::HardwareClock;
use crate::root_election::RootState;
use crate::status::SyncStatus;
use crate::sync_table::SyncTable;

struct Inner {
    table: SyncTable,
    root: RootState,
}

pub struct FtspEngine<H: HardwareClock> {
    node_id: u16,
    clock: Arc<LogicalClock<H>>,
    sink: Arc<dyn FrameSink>,
    config: Mutex<FtspConfig>,
    inner: Mutex<Inner>,
    status: Arc<RwLock<SyncStatus>>,
    paused: AtomicBool,
}

impl<H: HardwareClock> FtspEngine<H> {
    pub fn new(
        node_id: u16,
        clock: Arc<LogicalClock<H>>,
        sink: Arc<dyn FrameSink>,
        config: FtspConfig,
        status: Arc<RwLock<SyncStatus>>,
    ) -> Arc<Self> {
        Arc::new(FtspEngine {
            node_id,
            clock,
            sink,
            config: Mutex::new(config),
            inner: Mutex::new(Inner { table: SyncTable::new(), root: RootState::new(node_id) }),
            status,
            paused: AtomicBool::new(true),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        debug!("ftsp[{}]: paused", self.node_id);
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.table.clear();
        inner.root = RootState::new(self.node_id);
        self.paused.store(false, Ordering::SeqCst);
        debug!("ftsp[{}]: resumed", self.node_id);
    }

    pub fn set_beacon_delay(&self, secs: u64) {
        self.config.lock().unwrap().beacon_interval_secs = secs;
    }

    pub fn set_prop_time(&self, _us: u64) {
        // Transmission delay is owned by the shared transceiver config; FTSP
        // reads it at send time via the caller-supplied value in send_beacon.
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.config.lock().unwrap().beacon_interval_secs)
    }

    pub fn is_synced(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let cfg = self.config.lock().unwrap();
        inner.table.len() >= cfg.entry_valid_limit || inner.root.is_root()
    }

    fn publish_status(&self, inner: &Inner, offset_us: i64) {
        let mut status = self.status.write().unwrap();
        status.is_synced = inner.table.len() >= 4 || inner.root.is_root();
        status.root_id = Some(inner.root.root_id);
        status.table_entries = inner.table.len();
        status.last_offset_us = offset_us;
        status.relative_rate_ppm = self.clock.relative_rate() * 1_000_000.0;
        status.updated_local_us = self.clock.now().local;
    }

    /// Called by the owning node's periodic driver thread every beacon
    /// interval. Ticks root election, then sends a beacon if the local
    /// forwarding gate allows it.
    pub fn tick(&self, transmission_delay_us: u64) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.root.on_beacon_tick();

        let cfg = self.config.lock().unwrap();
        let should_send = inner.root.is_root() || inner.table.len() > cfg.entry_send_limit;
        if !should_send {
            self.publish_status(&inner, 0);
            return;
        }
        if inner.root.is_root() {
            inner.root.seq += 1;
        }
        let now = self.clock.now();
        let beacon = TreeBeacon {
            id: self.node_id,
            root: inner.root.root_id,
            seq_number: inner.root.seq,
            global: now.global + transmission_delay_us as i64,
        };
        let mut buf = Vec::with_capacity(crate::beacon::TREE_BEACON_LEN);
        beacon.encode(DispatchMarker::Ftsp, &mut buf);
        if let Err(e) = self.sink.send_broadcast(&buf) {
            warn!("ftsp[{}]: failed to send beacon: {e}", self.node_id);
        }
        self.publish_status(&inner, 0);
    }

    /// Receive-path entry point, invoked by the MAC layer (or a test
    /// double) once per accepted frame.
    pub fn mac_read(&self, payload: &[u8], toa: TimeVal) -> Result<(), CodecError> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(());
        }
        let beacon = TreeBeacon::decode(payload)?;

        let mut inner = self.inner.lock().unwrap();
        if inner.root.is_root() {
            return Ok(());
        }
        if !inner.root.on_beacon_received(beacon.id, beacon.root, beacon.seq_number) {
            return Ok(());
        }

        let currently_synced = inner.table.len() >= self.config.lock().unwrap().entry_valid_limit;
        let outcome = inner.table.insert(toa.local, beacon.global, toa.global, currently_synced);

        let fit = linear_regression(inner.table.iter());
        let est_global = fit.offset.wrapping_add((toa.local as f64 * fit.rate) as i64);
        let offset_global = est_global.wrapping_sub(toa.global);

        let cfg = self.config.lock().unwrap();
        let sane_limit = if currently_synced { cfg.sane_offset_synced_us } else { cfg.sane_offset_unsynced_us };
        if offset_global.unsigned_abs() > sane_limit as u64 {
            warn!(
                "ftsp[{}]: rejecting insane offset {offset_global}us (limit {sane_limit}us)",
                self.node_id
            );
            inner.table.clear();
            self.publish_status(&inner, offset_global);
            return Ok(());
        }

        self.clock.set_global_offset(offset_global);
        if outcome.table_entries >= cfg.rate_calc_threshold {
            self.clock.set_relative_rate(fit.rate - 1.0);
        }
        info!(
            "ftsp[{}]: accepted beacon from {}, table_entries={}, offset={offset_global}us",
            self.node_id, beacon.id, outcome.table_entries
        );
        self.publish_status(&inner, offset_global);
        Ok(())
    }
}
