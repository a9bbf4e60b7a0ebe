//! The top-level value owning the shared logical clock and the three
//! protocol engines. Mirrors the "typed polymorphism over three variants"
//! design note: FTSP, GTSP and PulseSync share no common trait object here —
//! [`Node::dispatch`] reads the wire dispatch-marker byte and routes to the
//! matching engine directly, the same way the original's single MAC receive
//! loop calls `ftsp_mac_read`/`gtsp_mac_read`/`pulsesync_mac_read` based on
//! the frame's first byte.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::beacon::DispatchMarker;
use crate::config::SystemConfig;
use crate::eval::EvalPrinter;
use crate::frame_sink::FrameSink;
use crate::gtimer::{LogicalClock, TimeVal};
use crate::hardware_clock::HardwareClock;
use crate::protocols::ftsp::FtspEngine;
use crate::protocols::gtsp::GtspEngine;
use crate::protocols::pulsesync::PulseSyncEngine;
use crate::status::SyncStatus;

/// Reimplements the source's explicit `thread_sleep`/`thread_wakeup` pair: a
/// driver thread waits out its beacon interval on this, but a [`Node::shutdown`]
/// wakes it immediately instead of waiting for the interval to elapse.
struct DriverControl {
    stop: Mutex<bool>,
    cv: Condvar,
}

impl DriverControl {
    fn new() -> Self {
        DriverControl { stop: Mutex::new(false), cv: Condvar::new() }
    }

    /// Waits up to `dur`, or until shutdown is signaled. Returns true if the
    /// caller should stop. Uses `wait_timeout_while` (not a bare
    /// `wait_timeout`) so a shutdown signaled before this call even starts
    /// waiting is not missed — it rechecks the flag before blocking.
    fn wait(&self, dur: Duration) -> bool {
        let stop = self.stop.lock().unwrap();
        let (stop, _) = self.cv.wait_timeout_while(stop, dur, |stop| !*stop).unwrap();
        *stop
    }

    fn signal_shutdown(&self) {
        *self.stop.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

pub struct Node<H: HardwareClock + 'static> {
    pub node_id: u16,
    pub clock: Arc<LogicalClock<H>>,
    pub ftsp: Arc<FtspEngine<H>>,
    pub gtsp: Arc<GtspEngine<H>>,
    pub pulsesync: Arc<PulseSyncEngine<H>>,
    pub eval: Arc<EvalPrinter<H>>,
    pub ftsp_status: Arc<RwLock<SyncStatus>>,
    pub gtsp_status: Arc<RwLock<SyncStatus>>,
    pub pulsesync_status: Arc<RwLock<SyncStatus>>,
    config: SystemConfig,
    driver: Arc<DriverControl>,
    driver_threads: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl<H: HardwareClock + 'static> Node<H> {
    pub fn new(node_id: u16, hw: H, sink: Arc<dyn FrameSink>, config: SystemConfig) -> Arc<Self> {
        let clock = LogicalClock::new(hw);
        let ftsp_status = Arc::new(RwLock::new(SyncStatus::default()));
        let gtsp_status = Arc::new(RwLock::new(SyncStatus::default()));
        let pulsesync_status = Arc::new(RwLock::new(SyncStatus::default()));

        let ftsp = FtspEngine::new(node_id, clock.clone(), sink.clone(), config.ftsp.clone(), ftsp_status.clone());
        let gtsp = GtspEngine::new(node_id, clock.clone(), sink.clone(), config.gtsp.clone(), gtsp_status.clone());
        let pulsesync = PulseSyncEngine::new(
            node_id,
            clock.clone(),
            sink.clone(),
            config.pulsesync.clone(),
            pulsesync_status.clone(),
        );
        let eval = Arc::new(EvalPrinter::new(node_id, clock.clone(), sink));

        Arc::new(Node {
            node_id,
            clock,
            ftsp,
            gtsp,
            pulsesync,
            eval,
            ftsp_status,
            gtsp_status,
            pulsesync_status,
            config,
            driver: Arc::new(DriverControl::new()),
            driver_threads: Mutex::new(None),
        })
    }

    /// Spawns the per-protocol cyclic driver threads (one per protocol plus
    /// the eval heartbeat), each ticking its engine once per beacon interval.
    /// A no-op if the threads are already running — guards against a second
    /// `start()` re-creating them, the same way the source's cyclic driver
    /// is only (re-)created when its `clock_pid` is unset.
    pub fn start(self: &Arc<Self>) {
        let mut threads = self.driver_threads.lock().unwrap();
        if threads.is_some() {
            return;
        }

        let n = Arc::clone(self);
        let ftsp_thread = thread::spawn(move || loop {
            if n.driver.wait(n.ftsp_interval()) {
                break;
            }
            n.ftsp.tick(n.transmission_delay_us());
        });

        let n = Arc::clone(self);
        let gtsp_thread = thread::spawn(move || loop {
            if n.driver.wait(n.gtsp_interval()) {
                break;
            }
            n.gtsp.tick(n.transmission_delay_us());
        });

        let n = Arc::clone(self);
        let pulsesync_thread = thread::spawn(move || loop {
            if n.driver.wait(n.pulsesync_interval()) {
                break;
            }
            n.pulsesync.tick(n.transmission_delay_us());
        });

        let n = Arc::clone(self);
        let eval_thread = thread::spawn(move || loop {
            if n.driver.wait(Duration::from_secs(1)) {
                break;
            }
            n.eval.heartbeat();
        });

        *threads = Some(vec![ftsp_thread, gtsp_thread, pulsesync_thread, eval_thread]);
    }

    /// Signals the driver threads to stop and joins them, so a `Node` can be
    /// dropped (e.g. at the end of a test) without leaking threads.
    pub fn shutdown(&self) {
        self.driver.signal_shutdown();
        if let Some(threads) = self.driver_threads.lock().unwrap().take() {
            for t in threads {
                let _ = t.join();
            }
        }
    }

    /// Routes a received frame to the matching protocol engine by its
    /// dispatch-marker byte. `src` is the sender's node id as resolved by
    /// the MAC layer from the frame's source address.
    pub fn dispatch(&self, payload: &[u8], src: u16, toa: TimeVal) {
        let Some(&marker) = payload.first() else { return };
        match DispatchMarker::from_byte(marker) {
            Ok(DispatchMarker::Ftsp) => {
                if let Err(e) = self.ftsp.mac_read(payload, toa) {
                    debug!("ftsp[{}]: dropping malformed frame from {src}: {e}", self.node_id);
                }
            }
            Ok(DispatchMarker::Gtsp) => {
                if let Err(e) = self.gtsp.mac_read(payload, src, toa) {
                    debug!("gtsp[{}]: dropping malformed frame from {src}: {e}", self.node_id);
                }
            }
            Ok(DispatchMarker::PulseSync) => match self.pulsesync.mac_read(payload, toa) {
                Ok(Some(delay)) => {
                    let engine = Arc::clone(&self.pulsesync);
                    let transmission_delay_us = self.config.transceiver.transmission_delay_us;
                    thread::spawn(move || {
                        thread::sleep(delay);
                        engine.send_relay(transmission_delay_us);
                    });
                }
                Ok(None) => {}
                Err(e) => debug!("pulsesync[{}]: dropping malformed frame from {src}: {e}", self.node_id),
            },
            Ok(DispatchMarker::ClockSyncEval) => {
                self.eval.on_received(payload, src, toa.local, toa.global);
            }
            Err(e) => debug!("node[{}]: dropping frame from {src}: {e}", self.node_id),
        }
    }

    pub fn transmission_delay_us(&self) -> u64 {
        self.config.transceiver.transmission_delay_us
    }

    pub fn ftsp_interval(&self) -> Duration {
        self.ftsp.beacon_interval()
    }

    pub fn gtsp_interval(&self) -> Duration {
        self.gtsp.beacon_interval()
    }

    pub fn pulsesync_interval(&self) -> Duration {
        self.pulsesync.beacon_interval()
    }
}
