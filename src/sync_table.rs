//! The bounded regression table shared by FTSP and PulseSync: up to
//! `MAX_ENTRIES` recent `(local, global)` observations of the root's clock,
//! evicted by age first and by recency second.
//!
//! Grounded on `add_new_entry`/`clear_table` in
//! `examples/original_source/sys/net/clocksync/pulsesync/pulsesync.c`, which
//! both evict stale entries and perform the insert in one pass.

pub const MAX_ENTRIES: usize = 8;
pub const MAX_SYNC_POINT_AGE_US: u64 = 20 * 60 * 1_000_000;
pub const ENTRY_THROWOUT_LIMIT_US: i64 = 300;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    full: bool,
    local: u64,
    global: i64,
}

/// Outcome of inserting a new observation, used by the caller to decide
/// whether to clear the table on repeated large errors.
pub struct InsertOutcome {
    pub table_entries: usize,
    pub time_error: i64,
}

#[derive(Default)]
pub struct SyncTable {
    entries: [Entry; MAX_ENTRIES],
    num_errors: u8,
}

impl SyncTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries = [Entry::default(); MAX_ENTRIES];
        self.num_errors = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.full).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a freshly received `(local, global)` sync point, evicting
    /// stale entries and the least-recent entry as needed. `currently_synced`
    /// gates the sanity check: while unsynchronized large errors are
    /// expected and not counted.
    pub fn insert(&mut self, local: u64, global: i64, toa_global: i64, currently_synced: bool) -> InsertOutcome {
        let limit_age = local.saturating_sub(MAX_SYNC_POINT_AGE_US);

        let time_error = global - toa_global;
        if currently_synced {
            if time_error.abs() > ENTRY_THROWOUT_LIMIT_US {
                self.num_errors += 1;
                if self.num_errors > 3 {
                    self.clear();
                }
            } else {
                self.num_errors = 0;
            }
        }

        let mut free_item: Option<usize> = None;
        let mut oldest_item = 0usize;
        let mut oldest_time = u64::MAX;
        let mut table_entries = 0usize;

        for (i, e) in self.entries.iter_mut().enumerate() {
            if e.full && e.local < limit_age {
                e.full = false;
            }
            if !e.full {
                free_item = Some(i);
            } else {
                table_entries += 1;
            }
            if e.local < oldest_time {
                oldest_time = e.local;
                oldest_item = i;
            }
        }

        let slot = match free_item {
            Some(i) => {
                table_entries += 1;
                i
            }
            None => oldest_item,
        };

        self.entries[slot] = Entry { full: true, local, global };

        InsertOutcome { table_entries, time_error }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, i64)> + '_ {
        self.entries.iter().filter(|e| e.full).map(|e| (e.local, e.global))
    }
}
