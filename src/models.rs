//! Core Data Models
//!
//! This module defines the primary data structures used throughout the grid
//! usage pipeline. The data flows through these models in the following
//! sequence:
//!
//! 1. **Raw Data**: [`Reading`] - Individual hourly samples parsed from the
//!    portal payload, grouped per day into [`DayReadings`]
//! 2. **Storage**: [`StatPoint`] - Cumulative `(start, sum)` records as kept
//!    by the statistics store, one series per statistic id
//! 3. **Inspection**: [`BoundaryJump`] - A discontinuity found between two
//!    consecutive calendar months of a cumulative series
//! 4. **Reports**: [`DailyData`], [`MonthlyData`] - Time-based aggregated
//!    views derived from the stored series
//!
//! ## Features
//!
//! - **Serde Integration**: All stored and reported types support
//!   serialization/deserialization
//! - **Stable ids**: [`MeterIds`] derives the statistic ids for a metering
//!   point deterministically, so imports, repair, and backup always address
//!   the same series

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month, the unit a cumulative series is partitioned into when
/// looking for boundary discontinuities.
pub type PeriodKey = (i32, u32);

/// One cumulative record as kept by the statistics store.
///
/// `sum` is the running total of the metric since the beginning of recording,
/// not the hourly increment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatPoint {
    pub start: DateTime<Utc>,
    pub sum: f64,
}

impl StatPoint {
    pub fn new(start: DateTime<Utc>, sum: f64) -> Self {
        Self { start, sum }
    }

    /// The calendar month this point falls into.
    pub fn period(&self) -> PeriodKey {
        (self.start.year(), self.start.month())
    }
}

/// One hourly sample extracted from the portal payload.
///
/// `cumulative_kwh` is the running total within the fetched window; the
/// importer rebases it onto the store's last saved sum before writing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub kwh: f64,
    pub cumulative_kwh: f64,
}

/// All hourly readings of a single provider day, in hour order.
#[derive(Debug, Clone, PartialEq)]
pub struct DayReadings {
    pub date: NaiveDate,
    pub points: Vec<Reading>,
}

impl DayReadings {
    /// Consumption covered by this day's readings.
    pub fn total_kwh(&self) -> f64 {
        self.points.iter().map(|p| p.kwh).sum()
    }
}

/// A month-boundary discontinuity in a cumulative series.
///
/// `jump` is signed: the first sum of `period` minus the last sum of the
/// preceding month. A correctly continued series keeps this within normal
/// hourly variation; the reset bug produced jumps of whole-month magnitude
/// in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundaryJump {
    /// The month the series jumps *into*.
    pub period: PeriodKey,
    #[serde(rename = "prevEnd")]
    pub prev_end: DateTime<Utc>,
    #[serde(rename = "nextStart")]
    pub next_start: DateTime<Utc>,
    pub jump: f64,
}

impl BoundaryJump {
    pub fn is_anomalous(&self, threshold: f64) -> bool {
        self.jump.abs() > threshold
    }
}

/// Statistic ids for the two series kept per metering point.
///
/// The id is derived from the POD (point of delivery) the same way for every
/// command, so import, verify, repair, and restore all address the same
/// records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterIds {
    pub pod: String,
    pub consumption: String,
    pub cost: String,
}

impl MeterIds {
    pub fn for_pod(pod: &str) -> Self {
        let normalized = normalize_pod(pod);
        Self {
            pod: pod.to_string(),
            consumption: format!("grid_{}_consumption", normalized),
            cost: format!("grid_{}_kw_cost", normalized),
        }
    }
}

/// Lowercase a POD and replace separator characters so the id is safe as a
/// statistic id and as a file name.
pub fn normalize_pod(pod: &str) -> String {
    pod.to_lowercase().replace(['-', '.'], "_")
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyData {
    pub date: String,
    pub kwh: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyData {
    pub month: String,
    pub kwh: f64,
    pub cost: f64,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    #[serde(rename = "daysImported")]
    pub days_imported: usize,
    #[serde(rename = "pointsImported")]
    pub points_imported: usize,
    #[serde(rename = "windowTotalKwh")]
    pub window_total_kwh: f64,
    #[serde(rename = "lastTimestamp")]
    pub last_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_meter_ids_normalization() {
        let ids = MeterIds::for_pod("IT001-E98.76");
        assert_eq!(ids.consumption, "grid_it001_e98_76_consumption");
        assert_eq!(ids.cost, "grid_it001_e98_76_kw_cost");
        assert_eq!(ids.pod, "IT001-E98.76");
    }

    #[test]
    fn test_stat_point_period() {
        let point = StatPoint::new(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), 42.0);
        assert_eq!(point.period(), (2024, 2));
    }

    #[test]
    fn test_boundary_jump_threshold() {
        let jump = BoundaryJump {
            period: (2024, 2),
            prev_end: Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap(),
            next_start: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            jump: -1200.0,
        };
        assert!(jump.is_anomalous(1000.0));
        assert!(!jump.is_anomalous(1500.0));
    }
}
