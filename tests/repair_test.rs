//! Property-style coverage of the cumulative-series repair over a realistic
//! multi-month history.

use chrono::{Datelike, Duration, TimeZone, Timelike, Utc};
use grid_usage::models::StatPoint;
use grid_usage::repair::{boundary_jumps, detect_jumps, repair, repair_pair};

// ~360 kWh accumulate per month at 0.5 kWh/h, so month-sized resets are well
// above this and single hours well below.
const THRESHOLD: f64 = 300.0;

/// Build an hourly series over the first `months` months of 2024, consuming
/// `per_hour` kWh every hour. Months listed in `reset_months` restart the
/// running total at zero, reproducing the historical importer bug.
fn corrupted_history(months: u32, per_hour: f64, reset_months: &[u32]) -> Vec<StatPoint> {
    let mut points = Vec::new();
    let mut sum = 0.0;
    let mut ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    while ts.year() == 2024 && ts.month() <= months {
        if reset_months.contains(&ts.month()) && ts.day() == 1 && ts.hour() == 0 {
            sum = 0.0;
        }
        sum += per_hour;
        points.push(StatPoint::new(ts, sum));
        ts += Duration::hours(1);
    }
    points
}

#[test]
fn test_every_reset_month_is_detected() {
    let series = corrupted_history(6, 0.5, &[3, 5]);

    let jumps = detect_jumps(&series, THRESHOLD);
    assert_eq!(jumps.len(), 2);
    assert_eq!(jumps[0].period, (2024, 3));
    assert_eq!(jumps[1].period, (2024, 5));
    assert!(jumps.iter().all(|j| j.jump < 0.0));
}

#[test]
fn test_repaired_history_is_monotonic_and_delta_preserving() {
    let series = corrupted_history(6, 0.5, &[3, 5]);
    let fixed = repair(&series, THRESHOLD);

    assert_eq!(fixed.len(), series.len());
    for (orig, corr) in series.iter().zip(&fixed) {
        assert_eq!(orig.start, corr.start);
    }

    // Monotonic everywhere once the resets are gone.
    for pair in fixed.windows(2) {
        assert!(
            pair[1].sum >= pair[0].sum - 1e-9,
            "series decreases at {}",
            pair[1].start
        );
    }

    // Intra-month deltas survive exactly.
    for (orig, corr) in series.windows(2).zip(fixed.windows(2)) {
        if orig[0].period() == orig[1].period() {
            let before = orig[1].sum - orig[0].sum;
            let after = corr[1].sum - corr[0].sum;
            assert!((before - after).abs() < 1e-9);
        }
    }

    // And no boundary jump above the threshold remains.
    for jump in boundary_jumps(&fixed) {
        assert!(jump.jump.abs() <= THRESHOLD);
    }
}

#[test]
fn test_clean_history_passes_through_unchanged() {
    let series = corrupted_history(6, 0.5, &[]);
    let fixed = repair(&series, THRESHOLD);
    assert_eq!(fixed, series);
}

#[test]
fn test_second_repair_changes_nothing() {
    let series = corrupted_history(6, 0.5, &[3]);
    let once = repair(&series, THRESHOLD);
    let twice = repair(&once, THRESHOLD);
    assert_eq!(once, twice);
}

#[test]
fn test_cost_series_tracks_consumption_through_repair() {
    let price = 0.33;
    let consumption = corrupted_history(6, 0.5, &[3, 5]);
    let cost: Vec<StatPoint> = consumption
        .iter()
        .map(|p| StatPoint::new(p.start, p.sum * price))
        .collect();

    let (fixed_kw, fixed_cost, jumps) = repair_pair(&consumption, &cost, THRESHOLD);
    assert_eq!(jumps.len(), 2);
    for (kw, c) in fixed_kw.iter().zip(&fixed_cost) {
        assert!((c.sum - kw.sum * price).abs() < 1e-6);
    }
}
