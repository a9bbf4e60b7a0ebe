//! Typed, serde-backed configuration, one section per protocol plus
//! transceiver calibration. Mirrors the defaults in
//! `examples/original_source/sys/net/clocksync/{ftsp,gtsp,pulsesync}/*.c`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub ftsp: FtspConfig,
    pub gtsp: GtspConfig,
    pub pulsesync: PulseSyncConfig,
    pub transceiver: TransceiverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtspConfig {
    pub beacon_interval_secs: u64,
    pub max_sync_point_age_us: u64,
    pub rate_calc_threshold: usize,
    pub entry_valid_limit: usize,
    pub entry_send_limit: usize,
    pub entry_throwout_limit_us: i64,
    pub sane_offset_synced_us: i64,
    pub sane_offset_unsynced_us: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtspConfig {
    pub beacon_interval_secs: u64,
    pub jump_threshold_us: i64,
    pub moving_alpha: f64,
    pub rate_clamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseSyncConfig {
    pub beacon_interval_secs: u64,
    pub max_sync_point_age_us: u64,
    pub rate_calc_threshold: usize,
    pub entry_valid_limit: usize,
    pub entry_send_limit: usize,
    pub entry_throwout_limit_us: i64,
    pub sane_offset_synced_us: i64,
    pub sane_offset_unsynced_us: i64,
    pub propagation_delay_lower_us: u64,
    pub propagation_delay_jitter_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransceiverConfig {
    pub transmission_delay_us: u64,
}

impl Default for FtspConfig {
    fn default() -> Self {
        FtspConfig {
            beacon_interval_secs: 30,
            max_sync_point_age_us: crate::sync_table::MAX_SYNC_POINT_AGE_US,
            rate_calc_threshold: 3,
            entry_valid_limit: 4,
            entry_send_limit: 3,
            entry_throwout_limit_us: crate::sync_table::ENTRY_THROWOUT_LIMIT_US,
            sane_offset_synced_us: 1_000_000,
            sane_offset_unsynced_us: 365 * 24 * 3_600 * 1_000_000,
        }
    }
}

impl Default for GtspConfig {
    fn default() -> Self {
        GtspConfig {
            beacon_interval_secs: 10,
            jump_threshold_us: 10,
            moving_alpha: crate::estimator::GTSP_MOVING_ALPHA,
            rate_clamp: crate::estimator::GTSP_RATE_CLAMP,
        }
    }
}

impl Default for PulseSyncConfig {
    fn default() -> Self {
        PulseSyncConfig {
            beacon_interval_secs: 10,
            max_sync_point_age_us: crate::sync_table::MAX_SYNC_POINT_AGE_US,
            rate_calc_threshold: 3,
            entry_valid_limit: 4,
            entry_send_limit: 3,
            entry_throwout_limit_us: crate::sync_table::ENTRY_THROWOUT_LIMIT_US,
            sane_offset_synced_us: 1_000_000,
            sane_offset_unsynced_us: 365 * 24 * 3_600 * 1_000_000,
            propagation_delay_lower_us: 1_000,
            propagation_delay_jitter_us: 10_000,
        }
    }
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        // PULSESYNC_CALIBRATION_OFFSET for the native/simulation transceiver.
        TransceiverConfig { transmission_delay_us: 1_500 }
    }
}

/// Load config from a JSON file, falling back to defaults (with a logged
/// warning) on any parse error rather than aborting.
pub fn load(path: Option<&std::path::Path>) -> SystemConfig {
    let Some(path) = path else { return SystemConfig::default() };
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("failed to parse config file {}: {e}; using defaults", path.display());
                SystemConfig::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read config file {}: {e}; using defaults", path.display());
            SystemConfig::default()
        }
    }
}
