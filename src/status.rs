//! Live status snapshots published by each protocol engine, read by the
//! `EvalPrinter` and by tests without taking the engine's own mutex.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SyncStatus {
    pub is_synced: bool,
    pub root_id: Option<u16>,
    pub neighbor_count: usize,
    pub table_entries: usize,
    pub last_offset_us: i64,
    pub relative_rate_ppm: f64,
    pub updated_local_us: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            is_synced: false,
            root_id: None,
            neighbor_count: 0,
            table_entries: 0,
            last_offset_us: 0,
            relative_rate_ppm: 0.0,
            updated_local_us: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_unsynced() {
        let status = SyncStatus::default();
        assert!(!status.is_synced);
        assert_eq!(status.root_id, None);
    }

    #[test]
    fn status_serde_roundtrip() {
        let status = SyncStatus {
            is_synced: true,
            root_id: Some(1),
            relative_rate_ppm: 12.5,
            ..SyncStatus::default()
        };

        let json = serde_json::to_string(&status).unwrap();
        let restored: SyncStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.root_id, Some(1));
        assert!((restored.relative_rate_ppm - 12.5).abs() < f64::EPSILON);
    }
}
