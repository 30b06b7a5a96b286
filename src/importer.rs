//! Import Engine
//!
//! Orchestrates one import run: fetch the portal payload, parse it into
//! hourly readings, and append whatever the store has not seen yet.
//!
//! The store keeps an absolute running total per metering point, while the
//! parsed payload carries a total local to the fetched window. The importer
//! rebases the window onto the store: it finds the parsed cumulative value at
//! the store's last saved timestamp and shifts every newer point so the
//! stored series continues without a seam. Points at or before the last
//! saved timestamp are skipped, so re-importing an overlapping window is
//! safe.
//!
//! Cost points are derived from the rebased consumption sums at the
//! configured price and written to the parallel cost series in the same run.

use crate::models::{ImportSummary, MeterIds, StatPoint};
use crate::parser::PortalParser;
use crate::source::ConsumptionSource;
use crate::store::StatisticsStore;
use anyhow::{Context, Result};
use tracing::info;

pub struct UsageImporter<'a> {
    store: &'a dyn StatisticsStore,
    ids: MeterIds,
    price_per_kwh: f64,
}

impl<'a> UsageImporter<'a> {
    pub fn new(store: &'a dyn StatisticsStore, ids: MeterIds, price_per_kwh: f64) -> Self {
        Self {
            store,
            ids,
            price_per_kwh,
        }
    }

    /// Fetch from `source` and store everything newer than the last saved
    /// point.
    pub async fn import(&self, source: &dyn ConsumptionSource) -> Result<ImportSummary> {
        info!(source = %source.describe(), pod = %self.ids.pod, "Starting import");
        let payload = source.fetch_payload().await?;
        self.import_payload(&payload)
    }

    /// Parse and store an already-fetched payload.
    pub fn import_payload(&self, payload: &serde_json::Value) -> Result<ImportSummary> {
        let days = PortalParser::parse_hourly(payload)?;

        let last = self
            .store
            .last_point(&self.ids.consumption)
            .context("Failed to read last saved statistic")?;
        let (last_saved_at, last_saved_sum) = match last {
            Some(point) => {
                info!(
                    statistic_id = %self.ids.consumption,
                    last_saved = %point.start,
                    last_sum_kwh = point.sum,
                    "Continuing from last saved statistic"
                );
                (Some(point.start), point.sum)
            }
            None => {
                info!(statistic_id = %self.ids.consumption, "No previous data found, starting fresh");
                (None, 0.0)
            }
        };

        // The parsed cumulative total is local to the fetched window. Shift
        // it so the first new point continues the stored series: subtract
        // whatever part of the window is already saved, add the stored sum.
        let consumed_before_resume = match last_saved_at {
            Some(cutoff) => days
                .iter()
                .flat_map(|d| &d.points)
                .filter(|p| p.timestamp <= cutoff)
                .last()
                .map(|p| p.cumulative_kwh)
                .unwrap_or(0.0),
            None => 0.0,
        };
        let rebase = last_saved_sum - consumed_before_resume;

        let mut summary = ImportSummary {
            days_imported: 0,
            points_imported: 0,
            window_total_kwh: days.iter().map(|d| d.total_kwh()).sum(),
            last_timestamp: last_saved_at,
        };

        for day in &days {
            let stats_kw: Vec<StatPoint> = day
                .points
                .iter()
                .filter(|p| last_saved_at.map_or(true, |cutoff| p.timestamp > cutoff))
                .map(|p| StatPoint::new(p.timestamp, p.cumulative_kwh + rebase))
                .collect();

            if stats_kw.is_empty() {
                continue;
            }

            let stats_cost: Vec<StatPoint> = stats_kw
                .iter()
                .map(|p| StatPoint::new(p.start, p.sum * self.price_per_kwh))
                .collect();

            self.store
                .upsert(&self.ids.consumption, &stats_kw)
                .with_context(|| format!("Failed to save statistics for {}", day.date))?;
            self.store
                .upsert(&self.ids.cost, &stats_cost)
                .with_context(|| format!("Failed to save cost statistics for {}", day.date))?;

            info!(
                day = %day.date,
                points = stats_kw.len(),
                "Saved new statistics"
            );

            summary.days_imported += 1;
            summary.points_imported += stats_kw.len();
            summary.last_timestamp = stats_kw.last().map(|p| p.start);
        }

        if summary.points_imported == 0 {
            info!(
                statistic_id = %self.ids.consumption,
                last_saved = ?last_saved_at,
                "No new data to save"
            );
        }

        Ok(summary)
    }
}
