//! Numeric cores shared by the protocol engines: the least-squares
//! regression used by FTSP/PulseSync, and the moving-average gradient
//! rate calculation used by GTSP.
//!
//! Grounded on `linear_regression()` in
//! `examples/original_source/sys/net/clocksync/pulsesync/pulsesync.c` and
//! `gtsp_compute_rate()` in
//! `examples/original_source/sys/net/clocksync/gtsp/gtsp.c`.

use crate::gtsp_table::GtspTable;

pub const GTSP_MOVING_ALPHA: f64 = 0.9;
pub const GTSP_RATE_CLAMP: f64 = 0.00005;

/// Result of a regression pass: `global ≈ rate * local + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub rate: f64,
    pub offset: i64,
}

/// Least-squares fit of `global` on `local` over the table's entries.
///
/// Sums are taken relative to the first entry to avoid overflowing i64 when
/// raw timestamps are large; entries live within a 20-minute window so the
/// relative values stay small.
pub fn linear_regression(entries: impl Iterator<Item = (u64, i64)>) -> Regression {
    let entries: Vec<(u64, i64)> = entries.collect();
    if entries.is_empty() {
        return Regression { rate: 1.0, offset: 0 };
    }

    let (ref_local, ref_global) = entries[0];
    let n = entries.len() as f64;

    let mut sum_local = 0i64;
    let mut sum_global = 0i64;
    let mut sum_local_sq = 0i64;
    let mut covariance = 0i64;

    // A beacon with a wildly out-of-range global timestamp (caught by the
    // sane-offset check only after this fit runs) can overflow these sums;
    // the original source has the same unresolved problem (see its
    // "TODO: fix overflow problem in offset calculation"), so this wraps
    // rather than panics, producing a fit the sanity check then rejects.
    for (local, global) in &entries {
        let l = (*local as i64).wrapping_sub(ref_local as i64);
        let g = global.wrapping_sub(ref_global);
        sum_local = sum_local.wrapping_add(l);
        sum_global = sum_global.wrapping_add(g);
        sum_local_sq = sum_local_sq.wrapping_add(l.wrapping_mul(l));
        covariance = covariance.wrapping_add(l.wrapping_mul(g));
    }

    let rate = if entries.len() > 1 {
        let num = covariance as f64 - (sum_local as f64 * sum_global as f64) / n;
        let den = sum_local_sq as f64 - (sum_local as f64 * sum_local as f64) / n;
        if den.abs() < f64::EPSILON { 1.0 } else { num / den }
    } else {
        1.0
    };

    let rel_offset = (sum_global as f64 - rate * sum_local as f64) / n;
    // undo the reference shift: global = rate*local + offset, with local, global
    // both shifted by (ref_local, ref_global); offset relative to the true origin:
    let offset = ref_global.wrapping_add(rel_offset as i64).wrapping_sub((rate * ref_local as f64) as i64);

    Regression { rate, offset }
}

/// GTSP rate averaging across the neighbor table, clamped to ±[`GTSP_RATE_CLAMP`].
pub fn gtsp_average_rate(own_rate: f64, neighbors: &GtspTable) -> f64 {
    let mut sum = own_rate;
    for sp in neighbors.iter() {
        sum += sp.relative_rate;
    }
    let avg = sum / (neighbors.len() as f64 + 1.0);
    avg.clamp(-GTSP_RATE_CLAMP, GTSP_RATE_CLAMP)
}

/// GTSP offset correction: average the offsets of neighbors that are ahead,
/// or only slightly behind (within `jump_threshold`), and apply the average
/// as a small pull — unless a discrete jump already happened this round.
pub fn gtsp_average_offset(neighbors: &GtspTable, jump_threshold: i64, already_jumped: bool) -> Option<i64> {
    if already_jumped {
        return None;
    }
    let mut sum = 0i64;
    let mut count = 0i64;
    for sp in neighbors.iter() {
        let offset = sp.remote_global - sp.local_global;
        if offset > 0 || offset.abs() < jump_threshold {
            sum += offset;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let correction = (sum as f64 / (count + 1) as f64).ceil() as i64;
    if correction.abs() < jump_threshold {
        Some(correction)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_recovers_exact_line() {
        // global = 2*local + 1000
        let points = vec![(0u64, 1000i64), (100, 1200), (200, 1400), (300, 1600)];
        let fit = linear_regression(points.into_iter());
        assert!((fit.rate - 2.0).abs() < 1e-6);
        assert!((fit.offset - 1000).abs() <= 1);
    }

    #[test]
    fn single_entry_assumes_unit_rate() {
        let fit = linear_regression(std::iter::once((500u64, 600i64)));
        assert_eq!(fit.rate, 1.0);
        assert_eq!(fit.offset, 100); // global = local + offset => 600 = 500 + 100
    }

    #[test]
    fn empty_table_is_neutral() {
        let fit = linear_regression(std::iter::empty());
        assert_eq!(fit.rate, 1.0);
        assert_eq!(fit.offset, 0);
    }

    #[test]
    fn gtsp_rate_is_clamped() {
        let mut table = GtspTable::new();
        table.allocate(1).relative_rate = 10.0; // absurd, must be clamped
        let rate = gtsp_average_rate(0.0, &table);
        assert!(rate <= GTSP_RATE_CLAMP);
    }

    #[test]
    fn gtsp_offset_ignored_after_jump() {
        let mut table = GtspTable::new();
        let sp = table.allocate(1);
        sp.remote_global = 10_000;
        sp.local_global = 0;
        assert!(gtsp_average_offset(&table, 10, true).is_none());
    }
}
