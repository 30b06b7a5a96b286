//! Output Formatting and Display Management
//!
//! All terminal and JSON output lives here: daily and monthly consumption
//! tables derived from the stored cumulative series, the boundary-jump
//! verification report, and the summaries printed after import and repair
//! runs. Aggregation is split from rendering so the JSON output and the
//! colored tables are built from the same rows.
//!
//! Daily consumption is the difference between a day's last stored sum and
//! the previous day's last stored sum; for the very first stored day only
//! the intra-day growth is known. Monthly rows are daily rows bucketed by
//! month. Negative deltas are rendered as-is: they mean the stored series
//! still carries an unrepaired discontinuity, which is exactly what `verify`
//! is for.

use crate::migration::MigrationReport;
use crate::models::{BoundaryJump, DailyData, ImportSummary, MonthlyData, StatPoint};
use chrono::NaiveDate;
use colored::Colorize;
use std::collections::BTreeMap;

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-day growth of a cumulative series.
fn daily_deltas(points: &[StatPoint]) -> Vec<(NaiveDate, f64)> {
    let mut last_by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut first_day_start: Option<(NaiveDate, f64)> = None;

    for point in points {
        let day = point.start.date_naive();
        if first_day_start.is_none() {
            first_day_start = Some((day, point.sum));
        }
        last_by_day.insert(day, point.sum);
    }

    let mut rows = Vec::with_capacity(last_by_day.len());
    let mut prev_sum: Option<f64> = None;

    for (day, sum) in last_by_day {
        let base = match prev_sum {
            Some(prev) => prev,
            // Opening day: only the growth after the first stored point is known.
            None => first_day_start.map(|(_, s)| s).unwrap_or(sum),
        };
        rows.push((day, sum - base));
        prev_sum = Some(sum);
    }
    rows
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    /// Build daily rows from the stored series pair. When the cost series is
    /// missing, cost falls back to consumption times `price_per_kwh`.
    pub fn daily_rows(
        &self,
        consumption: &[StatPoint],
        cost: &[StatPoint],
        price_per_kwh: f64,
    ) -> Vec<DailyData> {
        let cost_by_day: BTreeMap<NaiveDate, f64> = daily_deltas(cost).into_iter().collect();

        daily_deltas(consumption)
            .into_iter()
            .map(|(day, kwh)| DailyData {
                date: day.format("%Y-%m-%d").to_string(),
                kwh,
                cost: cost_by_day
                    .get(&day)
                    .copied()
                    .unwrap_or(kwh * price_per_kwh),
            })
            .collect()
    }

    /// Bucket daily rows by calendar month.
    pub fn monthly_rows(&self, daily: &[DailyData]) -> Vec<MonthlyData> {
        let mut by_month: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        for row in daily {
            let month = row.date.chars().take(7).collect::<String>();
            let entry = by_month.entry(month).or_insert((0.0, 0.0));
            entry.0 += row.kwh;
            entry.1 += row.cost;
        }

        by_month
            .into_iter()
            .map(|(month, (kwh, cost))| MonthlyData { month, kwh, cost })
            .collect()
    }

    pub fn display_daily(
        &self,
        rows: &[DailyData],
        limit: Option<usize>,
        currency: &str,
        json_output: bool,
    ) {
        let shown = tail(rows, limit);

        if json_output {
            let output = serde_json::json!({ "daily": shown });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            return;
        }

        if shown.is_empty() {
            println!("No consumption data stored yet.");
            return;
        }

        println!("{}", "Daily consumption".bold());
        for row in shown {
            println!(
                "  {}  {}  {}",
                row.date.cyan(),
                format!("{:>8.2} kWh", row.kwh).yellow(),
                format!("{:>8.2} {}", row.cost, currency).green()
            );
        }
        let total_kwh: f64 = shown.iter().map(|r| r.kwh).sum();
        let total_cost: f64 = shown.iter().map(|r| r.cost).sum();
        println!(
            "  {} {:>10.2} kWh  {:>8.2} {}",
            "total".bold(),
            total_kwh,
            total_cost,
            currency
        );
    }

    pub fn display_monthly(
        &self,
        rows: &[MonthlyData],
        limit: Option<usize>,
        currency: &str,
        json_output: bool,
    ) {
        let shown = tail(rows, limit);

        if json_output {
            let output = serde_json::json!({ "monthly": shown });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            return;
        }

        if shown.is_empty() {
            println!("No consumption data stored yet.");
            return;
        }

        println!("{}", "Monthly consumption".bold());
        for row in shown {
            println!(
                "  {}  {}  {}",
                row.month.cyan(),
                format!("{:>9.2} kWh", row.kwh).yellow(),
                format!("{:>9.2} {}", row.cost, currency).green()
            );
        }
    }

    /// Days whose consumption falls outside the typical daily band. The
    /// band is a per-household heuristic; these are pointers for a human,
    /// not anomalies the repair would act on.
    pub fn daily_outliers(&self, daily: &[DailyData], band: (f64, f64)) -> Vec<DailyData> {
        daily
            .iter()
            .filter(|row| row.kwh < band.0 || row.kwh > band.1)
            .cloned()
            .collect()
    }

    /// Render the boundary scan: every month boundary with its jump, flagged
    /// against the anomaly threshold, plus any days outside the typical band.
    pub fn display_verify(
        &self,
        jumps: &[BoundaryJump],
        threshold: f64,
        outliers: &[DailyData],
        band: (f64, f64),
        json_output: bool,
    ) {
        let anomalous: Vec<&BoundaryJump> =
            jumps.iter().filter(|j| j.is_anomalous(threshold)).collect();

        if json_output {
            let output = serde_json::json!({
                "thresholdKwh": threshold,
                "boundaries": jumps,
                "anomalousCount": anomalous.len(),
                "typicalDailyBandKwh": [band.0, band.1],
                "dailyOutliers": outliers,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            return;
        }

        if jumps.is_empty() {
            println!("Fewer than two months stored, nothing to check.");
            return;
        }

        println!("{}", "Month-boundary check".bold());
        for jump in jumps {
            let label = format!("{:04}-{:02}", jump.period.0, jump.period.1);
            if jump.is_anomalous(threshold) {
                println!(
                    "  {}  {}",
                    label.cyan(),
                    format!("{:+10.2} kWh  ANOMALOUS", jump.jump).red().bold()
                );
            } else {
                println!("  {}  {}", label.cyan(), format!("{:+10.2} kWh  ok", jump.jump).green());
            }
        }

        if anomalous.is_empty() {
            println!("{}", "All month boundaries are continuous.".green());
        } else {
            println!(
                "{}",
                format!(
                    "{} anomalous boundary jump(s) found, run `grid-usage repair`.",
                    anomalous.len()
                )
                .red()
                .bold()
            );
        }

        if !outliers.is_empty() {
            println!(
                "{}",
                format!(
                    "Days outside the typical {:.0}-{:.0} kWh band:",
                    band.0, band.1
                )
                .bold()
            );
            for row in outliers {
                println!(
                    "  {}  {}",
                    row.date.cyan(),
                    format!("{:>8.2} kWh", row.kwh).yellow()
                );
            }
        }
    }

    pub fn display_import_summary(&self, summary: &ImportSummary, json_output: bool) {
        if json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(summary).unwrap_or_default()
            );
            return;
        }

        if summary.points_imported == 0 {
            println!("Already up to date, nothing new to import.");
        } else {
            println!(
                "Imported {} point(s) across {} day(s), window total {:.2} kWh.",
                summary.points_imported, summary.days_imported, summary.window_total_kwh
            );
        }
        if let Some(ts) = summary.last_timestamp {
            println!("Last stored point: {}", ts.to_rfc3339().cyan());
        }
    }

    pub fn display_migration_report(&self, report: &MigrationReport, json_output: bool) {
        if json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(report).unwrap_or_default()
            );
            return;
        }

        if report.skipped {
            println!(
                "Statistics already at schema version {}, nothing to do.",
                report.from_version
            );
            return;
        }

        println!(
            "Migrated statistics from schema version {} to {}.",
            report.from_version, report.to_version
        );
        println!(
            "  anomalous boundaries fixed: {}",
            report.anomalies.len().to_string().yellow()
        );
        println!(
            "  records rewritten: {} consumption, {} cost",
            report.consumption_records, report.cost_records
        );
        if let Some(path) = &report.backup_path {
            println!("  backup: {}", path.display().to_string().cyan());
        }
    }
}

fn tail<T>(rows: &[T], limit: Option<usize>) -> &[T] {
    match limit {
        Some(n) if n < rows.len() => &rows[rows.len() - n..],
        _ => rows,
    }
}
