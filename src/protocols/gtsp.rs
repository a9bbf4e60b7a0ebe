//! GTSP: fully decentralized neighbor-gradient synchronization.
//!
//! Grounded on `examples/original_source/sys/net/clocksync/gtsp/gtsp.c`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use std::collections::HashSet;

use log::{debug, warn};

use crate::beacon::GtspBeacon;
use crate::config::GtspConfig;
use crate::error::CodecError;
use crate::estimator::{gtsp_average_offset, gtsp_average_rate};
use crate::frame_sink::FrameSink;
use crate::gtimer::{LogicalClock, TimeVal};
use crate::gtsp_table::GtspTable;
use crate::hardware_clock::HardwareClock;
use crate::status::SyncStatus;

struct Inner {
    neighbors: GtspTable,
    jumped: bool,
}

pub struct GtspEngine<H: HardwareClock> {
    node_id: u16,
    clock: Arc<LogicalClock<H>>,
    sink: Arc<dyn FrameSink>,
    config: Mutex<GtspConfig>,
    inner: Mutex<Inner>,
    status: Arc<RwLock<SyncStatus>>,
    paused: AtomicBool,
    /// Addresses whose sync points get an extra debug-log line on update,
    /// toggled through the `gtsp trigger add/rm <addr>` shell command.
    triggers: Mutex<HashSet<u16>>,
}

impl<H: HardwareClock> GtspEngine<H> {
    pub fn new(
        node_id: u16,
        clock: Arc<LogicalClock<H>>,
        sink: Arc<dyn FrameSink>,
        config: GtspConfig,
        status: Arc<RwLock<SyncStatus>>,
    ) -> Arc<Self> {
        Arc::new(GtspEngine {
            node_id,
            clock,
            sink,
            config: Mutex::new(config),
            inner: Mutex::new(Inner { neighbors: GtspTable::new(), jumped: false }),
            status,
            paused: AtomicBool::new(true),
            triggers: Mutex::new(HashSet::new()),
        })
    }

    pub fn add_trigger_address(&self, addr: u16) {
        self.triggers.lock().unwrap().insert(addr);
    }

    pub fn remove_trigger_address(&self, addr: u16) {
        self.triggers.lock().unwrap().remove(&addr);
    }

    pub fn trigger_addresses(&self) -> Vec<u16> {
        self.triggers.lock().unwrap().iter().copied().collect()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.neighbors = GtspTable::new();
        inner.jumped = false;
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn set_beacon_delay(&self, secs: u64) {
        self.config.lock().unwrap().beacon_interval_secs = secs;
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.config.lock().unwrap().beacon_interval_secs)
    }

    pub fn is_synced(&self) -> bool {
        !self.inner.lock().unwrap().neighbors.is_empty()
    }

    fn publish_status(&self, inner: &Inner) {
        let mut status = self.status.write().unwrap();
        status.is_synced = !inner.neighbors.is_empty();
        status.root_id = None;
        status.neighbor_count = inner.neighbors.len();
        status.relative_rate_ppm = self.clock.relative_rate() * 1_000_000.0;
        status.updated_local_us = self.clock.now().local;
    }

    pub fn tick(&self, transmission_delay_us: u64) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        let now = self.clock.now();
        let beacon = GtspBeacon {
            local: now.local + transmission_delay_us,
            global: now.global + transmission_delay_us as i64,
            relative_rate: now.rate as f32,
        };
        let mut buf = Vec::with_capacity(crate::beacon::GTSP_BEACON_LEN);
        beacon.encode(&mut buf);
        if let Err(e) = self.sink.send_broadcast(&buf) {
            warn!("gtsp[{}]: failed to send beacon: {e}", self.node_id);
        }
    }

    /// `src` is the neighbor's node id as resolved by the MAC layer from the
    /// frame's source address (not carried in the beacon body itself).
    pub fn mac_read(&self, payload: &[u8], src: u16, toa: TimeVal) -> Result<(), CodecError> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(());
        }
        let beacon = GtspBeacon::decode(payload)?;
        let cfg = self.config.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();

        let relative_rate = match inner.neighbors.lookup(src) {
            Some(sp) => {
                let delta_local = toa.local as i64 - sp.local_local as i64;
                let delta_remote = (beacon.local as i64 - sp.remote_local as i64) as f64
                    * (1.0 + beacon.relative_rate as f64)
                    - 10.0; // float-calc compensation on FPU-less platforms
                let current_rate = if delta_local != 0 {
                    (delta_remote - delta_local as f64) / delta_local as f64
                } else {
                    sp.relative_rate
                };
                cfg.moving_alpha * sp.relative_rate + (1.0 - cfg.moving_alpha) * current_rate
            }
            None => 0.0,
        };

        let sp = match inner.neighbors.lookup_mut(src) {
            Some(sp) => sp,
            None => inner.neighbors.allocate(src),
        };
        sp.local_local = toa.local;
        sp.local_global = toa.global;
        sp.remote_local = beacon.local;
        sp.remote_global = beacon.global;
        sp.remote_rate = beacon.relative_rate;
        sp.relative_rate = relative_rate;

        if self.triggers.lock().unwrap().contains(&src) {
            debug!(
                "gtsp[{}]: trigger {src}: local_local={} local_global={} remote_local={} remote_global={} rate={relative_rate}",
                self.node_id, sp.local_local, sp.local_global, sp.remote_local, sp.remote_global
            );
        }

        let offset = beacon.global - toa.global;
        if offset > cfg.jump_threshold_us {
            inner.jumped = true;
            self.clock.set_global_offset(offset);
        } else {
            inner.jumped = false;
        }

        let own_rate = self.clock.relative_rate();
        let avg_rate = gtsp_average_rate(own_rate, &inner.neighbors);
        self.clock.set_relative_rate(avg_rate);

        if let Some(correction) =
            gtsp_average_offset(&inner.neighbors, cfg.jump_threshold_us, inner.jumped)
        {
            self.clock.set_global_offset(correction);
        }

        self.publish_status(&inner);
        Ok(())
    }
}
