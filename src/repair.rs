//! Cumulative Series Repair
//!
//! Early versions of the importer restarted the running total at month
//! boundaries instead of continuing from the previous month's last sum. The
//! stored cumulative series therefore contains large spurious jumps (drops
//! back towards zero, or spikes where a stale total was picked up) at some
//! month boundaries, while every hour-to-hour delta inside a month is still
//! correct.
//!
//! This module rebuilds such a series into a single continuous running total:
//!
//! 1. Partition the series into calendar months.
//! 2. Measure the jump at every month boundary; a jump larger than the
//!    configured threshold is a reset artifact, not consumption.
//! 3. Walk the months in order carrying a running offset. At each anomalous
//!    boundary the offset absorbs the jump, so the first corrected value of
//!    the month lines up exactly with the last corrected value of the month
//!    before it.
//! 4. Every value in a month gets the same offset added, which keeps all
//!    intra-month deltas bit-identical to the input.
//!
//! The whole transform is a pure fold over an in-memory slice: the offset is
//! an explicit accumulator, there is no global state, and nothing here talks
//! to the statistics store. A series with no anomalous boundaries passes
//! through unchanged.
//!
//! A parallel cost series sharing the same timestamps is corrected with
//! [`repair_with_boundaries`] against the boundary set detected on the
//! consumption series, using its own jumps and its own offset accumulator.

use crate::models::{BoundaryJump, PeriodKey, StatPoint};
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::ops::Range;

/// Verify that a series is strictly ordered by timestamp.
///
/// A series that is not ordered cannot be partitioned into months, so callers
/// abort before touching the store.
pub fn validate_ordering(points: &[StatPoint]) -> Result<()> {
    for pair in points.windows(2) {
        if pair[1].start <= pair[0].start {
            bail!(
                "series is not strictly ordered by timestamp: {} followed by {}",
                pair[0].start,
                pair[1].start
            );
        }
    }
    Ok(())
}

/// Split an ordered series into consecutive calendar-month runs.
fn periods(points: &[StatPoint]) -> Vec<(PeriodKey, Range<usize>)> {
    let mut runs = Vec::new();
    let mut start = 0;

    for i in 1..points.len() {
        if points[i].period() != points[start].period() {
            runs.push((points[start].period(), start..i));
            start = i;
        }
    }
    if !points.is_empty() {
        runs.push((points[start].period(), start..points.len()));
    }
    runs
}

/// Compute the jump at every month boundary of an ordered series.
pub fn boundary_jumps(points: &[StatPoint]) -> Vec<BoundaryJump> {
    let runs = periods(points);
    let mut jumps = Vec::new();

    for pair in runs.windows(2) {
        let (_, ref prev) = pair[0];
        let (period, ref next) = pair[1];
        let last = points[prev.end - 1];
        let first = points[next.start];
        jumps.push(BoundaryJump {
            period,
            prev_end: last.start,
            next_start: first.start,
            jump: first.sum - last.sum,
        });
    }
    jumps
}

/// Return every month boundary whose jump magnitude exceeds `threshold`, in
/// chronological order. Pure inspection, no side effects.
pub fn detect_jumps(points: &[StatPoint], threshold: f64) -> Vec<BoundaryJump> {
    boundary_jumps(points)
        .into_iter()
        .filter(|j| j.is_anomalous(threshold))
        .collect()
}

/// Correct a series against a known set of anomalous boundaries.
///
/// `anomalous` holds the months whose *entry* boundary was flagged. At each
/// flagged boundary the running offset absorbs this series' own jump, pinning
/// the month's first corrected value to the previous month's last corrected
/// value; everywhere else the current offset is applied unchanged. Timestamps
/// and length are preserved exactly.
pub fn repair_with_boundaries(
    points: &[StatPoint],
    anomalous: &HashSet<PeriodKey>,
) -> Vec<StatPoint> {
    let runs = periods(points);
    let mut corrected = Vec::with_capacity(points.len());
    let mut offset = 0.0;

    for (i, (period, range)) in runs.iter().enumerate() {
        if i > 0 && anomalous.contains(period) {
            let prev_last = points[range.start - 1].sum;
            let first = points[range.start].sum;
            offset -= first - prev_last;
        }
        for point in &points[range.clone()] {
            corrected.push(StatPoint::new(point.start, point.sum + offset));
        }
    }
    corrected
}

/// Detect anomalous boundaries and correct the series in one pass.
///
/// Empty input yields empty output. A series with no anomalous jumps is
/// returned unchanged (the offset stays zero throughout).
pub fn repair(points: &[StatPoint], threshold: f64) -> Vec<StatPoint> {
    let anomalous: HashSet<PeriodKey> = detect_jumps(points, threshold)
        .into_iter()
        .map(|j| j.period)
        .collect();
    repair_with_boundaries(points, &anomalous)
}

/// Correct a consumption series and its co-indexed cost series together.
///
/// Anomalies are detected on the consumption series only; both series are
/// then corrected over that same boundary set, each with its own offset
/// accumulator. Returns the corrected pair and the detected jumps.
pub fn repair_pair(
    consumption: &[StatPoint],
    cost: &[StatPoint],
    threshold: f64,
) -> (Vec<StatPoint>, Vec<StatPoint>, Vec<BoundaryJump>) {
    let jumps = detect_jumps(consumption, threshold);
    let anomalous: HashSet<PeriodKey> = jumps.iter().map(|j| j.period).collect();

    let fixed_consumption = repair_with_boundaries(consumption, &anomalous);
    let fixed_cost = repair_with_boundaries(cost, &anomalous);
    (fixed_consumption, fixed_cost, jumps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pt(y: i32, m: u32, d: u32, h: u32, sum: f64) -> StatPoint {
        StatPoint::new(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(), sum)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_empty_series_is_noop() {
        assert!(repair(&[], 1000.0).is_empty());
        assert!(detect_jumps(&[], 1000.0).is_empty());
    }

    #[test]
    fn test_single_point_is_noop() {
        let series = vec![pt(2024, 1, 15, 10, 250.0)];
        assert_eq!(repair(&series, 1000.0), series);
    }

    #[test]
    fn test_validate_ordering_rejects_duplicates_and_regressions() {
        let sorted = vec![pt(2024, 1, 1, 0, 1.0), pt(2024, 1, 1, 1, 2.0)];
        assert!(validate_ordering(&sorted).is_ok());

        let duplicated = vec![pt(2024, 1, 1, 0, 1.0), pt(2024, 1, 1, 0, 2.0)];
        assert!(validate_ordering(&duplicated).is_err());

        let regressed = vec![pt(2024, 1, 1, 1, 1.0), pt(2024, 1, 1, 0, 2.0)];
        assert!(validate_ordering(&regressed).is_err());
    }

    #[test]
    fn test_detects_spike_at_month_boundary() {
        // Jan ends at 100, Feb opens at 5000: a stale total was picked up.
        let series = vec![
            pt(2024, 1, 31, 23, 100.0),
            pt(2024, 2, 1, 0, 5000.0),
            pt(2024, 2, 1, 1, 5015.0),
        ];

        let jumps = detect_jumps(&series, 1000.0);
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].period, (2024, 2));
        assert_close(jumps[0].jump, 4900.0);
        assert_eq!(jumps[0].prev_end, series[0].start);
        assert_eq!(jumps[0].next_start, series[1].start);
    }

    #[test]
    fn test_repairs_spike_preserving_deltas() {
        let series = vec![
            pt(2024, 1, 31, 23, 100.0),
            pt(2024, 2, 1, 0, 5000.0),
            pt(2024, 2, 1, 1, 5015.0),
        ];

        let fixed = repair(&series, 1000.0);
        assert_close(fixed[0].sum, 100.0);
        assert_close(fixed[1].sum, 100.0);
        assert_close(fixed[2].sum, 115.0);
        // Intra-month delta survives untouched.
        assert_close(fixed[2].sum - fixed[1].sum, series[2].sum - series[1].sum);
    }

    #[test]
    fn test_normal_boundary_is_left_alone() {
        let series = vec![pt(2024, 1, 31, 23, 100.0), pt(2024, 2, 1, 0, 102.0)];

        assert!(detect_jumps(&series, 1000.0).is_empty());
        assert_eq!(repair(&series, 1000.0), series);
    }

    #[test]
    fn test_repairs_reset_drop() {
        // The more common shape of the bug: the total restarts near zero.
        let series = vec![
            pt(2024, 1, 31, 22, 2990.0),
            pt(2024, 1, 31, 23, 3000.0),
            pt(2024, 2, 1, 0, 2.0),
            pt(2024, 2, 1, 1, 14.0),
        ];

        let fixed = repair(&series, 1000.0);
        assert_close(fixed[1].sum, 3000.0);
        assert_close(fixed[2].sum, 3000.0);
        assert_close(fixed[3].sum, 3012.0);
    }

    #[test]
    fn test_offset_accumulates_over_consecutive_resets() {
        // Two months in a row reset to near zero; the offsets compound.
        let series = vec![
            pt(2024, 1, 31, 23, 3000.0),
            pt(2024, 2, 1, 0, 5.0),
            pt(2024, 2, 29, 23, 2800.0),
            pt(2024, 3, 1, 0, 3.0),
            pt(2024, 3, 1, 1, 12.0),
        ];

        let fixed = repair(&series, 1000.0);
        assert_close(fixed[1].sum, 3000.0);
        assert_close(fixed[2].sum, 5795.0); // 3000 + (2800 - 5)
        assert_close(fixed[3].sum, 5795.0);
        assert_close(fixed[4].sum, 5804.0);
    }

    #[test]
    fn test_delta_invariance_and_timestamp_preservation() {
        let series = vec![
            pt(2024, 1, 31, 22, 990.0),
            pt(2024, 1, 31, 23, 1000.0),
            pt(2024, 2, 1, 0, 7.0),
            pt(2024, 2, 1, 1, 19.0),
            pt(2024, 2, 28, 23, 950.0),
            pt(2024, 3, 1, 0, 4.0),
            pt(2024, 3, 1, 1, 13.0),
        ];

        let fixed = repair(&series, 500.0);
        assert_eq!(fixed.len(), series.len());

        for (orig, corr) in series.iter().zip(&fixed) {
            assert_eq!(orig.start, corr.start);
        }
        for (orig, corr) in series.windows(2).zip(fixed.windows(2)) {
            if orig[0].period() == orig[1].period() {
                assert_close(corr[1].sum - corr[0].sum, orig[1].sum - orig[0].sum);
            }
        }
    }

    #[test]
    fn test_post_repair_boundaries_are_continuous() {
        let series = vec![
            pt(2024, 1, 31, 23, 1000.0),
            pt(2024, 2, 1, 0, 7.0),
            pt(2024, 2, 28, 23, 950.0),
            pt(2024, 3, 1, 0, 953.0),
            pt(2024, 3, 31, 23, 1890.0),
            pt(2024, 4, 1, 0, 11.0),
        ];

        let fixed = repair(&series, 500.0);
        for jump in boundary_jumps(&fixed) {
            assert!(
                jump.jump.abs() <= 500.0,
                "boundary into {:?} still jumps by {}",
                jump.period,
                jump.jump
            );
        }
    }

    #[test]
    fn test_repair_is_idempotent() {
        let series = vec![
            pt(2024, 1, 31, 23, 1000.0),
            pt(2024, 2, 1, 0, 3.0),
            pt(2024, 2, 1, 1, 15.0),
        ];

        let once = repair(&series, 500.0);
        let twice = repair(&once, 500.0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_pair_repair_shares_boundaries_with_own_offsets() {
        let price = 0.33;
        let consumption = vec![
            pt(2024, 1, 31, 23, 1000.0),
            pt(2024, 2, 1, 0, 5.0),
            pt(2024, 2, 1, 1, 17.0),
        ];
        let cost: Vec<StatPoint> = consumption
            .iter()
            .map(|p| StatPoint::new(p.start, p.sum * price))
            .collect();

        let (fixed_kw, fixed_cost, jumps) = repair_pair(&consumption, &cost, 500.0);
        assert_eq!(jumps.len(), 1);

        // The cost series is corrected at the same boundary using its own jump,
        // so it stays an exact multiple of the corrected consumption.
        for (kw, c) in fixed_kw.iter().zip(&fixed_cost) {
            assert_eq!(kw.start, c.start);
            assert_close(c.sum, kw.sum * price);
        }
    }

    #[test]
    fn test_pair_repair_ignores_cost_only_excursions() {
        // A tariff change can move the cost series sharply without any
        // consumption anomaly; the shared boundary set must leave it alone.
        let consumption = vec![pt(2024, 1, 31, 23, 100.0), pt(2024, 2, 1, 0, 103.0)];
        let cost = vec![pt(2024, 1, 31, 23, 33.0), pt(2024, 2, 1, 0, 650.0)];

        let (_, fixed_cost, jumps) = repair_pair(&consumption, &cost, 50.0);
        assert!(jumps.is_empty());
        assert_eq!(fixed_cost, cost);
    }
}
