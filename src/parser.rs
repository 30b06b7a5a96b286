//! Provider Payload Parsing
//!
//! The provider portal answers consumption queries with a JSON document of
//! nested aggregations. The one this tool cares about is the hourly
//! consumption aggregation:
//!
//! ```json
//! {
//!   "data": {
//!     "aggregationResult": {
//!       "aggregations": [
//!         {
//!           "referenceID": "hourlyConsumption",
//!           "results": [
//!             {
//!               "date": "01022024",
//!               "binValues": [
//!                 { "name": "h1", "value": 0.31 },
//!                 { "name": "h2", "value": 0.28 }
//!               ]
//!             }
//!           ]
//!         }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Each bin holds the consumption of one hour (`h1` covers 00:00-01:00).
//! Parsing walks the days chronologically and carries the running total
//! across day boundaries, so the cumulative values of a multi-day window are
//! continuous. The importer later rebases that window-local total onto the
//! store's last saved sum.

use crate::models::{DayReadings, Reading};
use crate::timestamp_parser::TimestampParser;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

const HOURLY_AGGREGATION_ID: &str = "hourlyConsumption";

#[derive(Debug, Deserialize)]
struct Payload {
    data: PayloadData,
}

#[derive(Debug, Deserialize)]
struct PayloadData {
    #[serde(rename = "aggregationResult")]
    aggregation_result: AggregationResult,
}

#[derive(Debug, Deserialize)]
struct AggregationResult {
    #[serde(default)]
    aggregations: Vec<Aggregation>,
}

#[derive(Debug, Deserialize)]
struct Aggregation {
    #[serde(rename = "referenceID")]
    reference_id: String,
    #[serde(default)]
    results: Vec<DayResult>,
}

#[derive(Debug, Deserialize)]
struct DayResult {
    date: String,
    #[serde(rename = "binValues", default)]
    bin_values: Vec<BinValue>,
}

#[derive(Debug, Deserialize)]
struct BinValue {
    name: String,
    value: f64,
}

pub struct PortalParser;

impl PortalParser {
    /// Extract all hourly readings from a payload, grouped per day, with a
    /// running cumulative total carried across days.
    pub fn parse_hourly(payload: &serde_json::Value) -> Result<Vec<DayReadings>> {
        let payload: Payload = serde_json::from_value(payload.clone())
            .context("Payload does not match the expected aggregation structure")?;

        let hourly = payload
            .data
            .aggregation_result
            .aggregations
            .into_iter()
            .find(|agg| agg.reference_id == HOURLY_AGGREGATION_ID)
            .context("No hourly consumption data found in payload")?;

        let mut day_results = Vec::with_capacity(hourly.results.len());
        for result in hourly.results {
            let date = TimestampParser::parse_day(&result.date)?;
            day_results.push((date, result.bin_values));
        }
        day_results.sort_by_key(|(date, _)| *date);

        let mut days = Vec::with_capacity(day_results.len());
        let mut cumulative = 0.0;

        for (date, bins) in day_results {
            // Accumulation order must match hour order, so sort before summing.
            let mut hours = Vec::with_capacity(bins.len());
            for bin in bins {
                let hour = TimestampParser::parse_hour_bin(&bin.name)
                    .with_context(|| format!("Bad bin in day {}", date))?;
                hours.push((hour, bin.value));
            }
            hours.sort_by_key(|(hour, _)| *hour);

            let mut points = Vec::with_capacity(hours.len());
            for (hour, kwh) in hours {
                cumulative += kwh;
                points.push(Reading {
                    timestamp: TimestampParser::bin_timestamp(date, hour)?,
                    kwh,
                    cumulative_kwh: cumulative,
                });
            }
            days.push(DayReadings { date, points });
        }

        debug!(
            days = days.len(),
            points = days.iter().map(|d| d.points.len()).sum::<usize>(),
            "Parsed hourly consumption payload"
        );

        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> serde_json::Value {
        json!({
            "data": {
                "aggregationResult": {
                    "aggregations": [
                        { "referenceID": "dailyConsumption", "results": [] },
                        {
                            "referenceID": "hourlyConsumption",
                            "results": [
                                {
                                    "date": "02022024",
                                    "binValues": [
                                        { "name": "h1", "value": 0.5 },
                                        { "name": "h2", "value": 0.7 }
                                    ]
                                },
                                {
                                    "date": "01022024",
                                    "binValues": [
                                        { "name": "h1", "value": 0.3 },
                                        { "name": "h2", "value": 0.4 }
                                    ]
                                }
                            ]
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_parses_days_in_chronological_order() {
        let days = PortalParser::parse_hourly(&sample_payload()).unwrap();
        assert_eq!(days.len(), 2);
        assert!(days[0].date < days[1].date);
        assert_eq!(days[0].points.len(), 2);
    }

    #[test]
    fn test_cumulative_carries_across_days() {
        let days = PortalParser::parse_hourly(&sample_payload()).unwrap();
        let last_of_first = days[0].points.last().unwrap();
        let first_of_second = &days[1].points[0];

        assert!((last_of_first.cumulative_kwh - 0.7).abs() < 1e-9);
        assert!((first_of_second.cumulative_kwh - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_day_totals() {
        let days = PortalParser::parse_hourly(&sample_payload()).unwrap();
        assert!((days[0].total_kwh() - 0.7).abs() < 1e-9);
        assert!((days[1].total_kwh() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_missing_hourly_aggregation_is_an_error() {
        let payload = json!({
            "data": { "aggregationResult": { "aggregations": [
                { "referenceID": "dailyConsumption", "results": [] }
            ] } }
        });
        let err = PortalParser::parse_hourly(&payload).unwrap_err();
        assert!(err.to_string().contains("No hourly consumption data"));
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(PortalParser::parse_hourly(&json!({"data": {}})).is_err());
        assert!(PortalParser::parse_hourly(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_unordered_bins_accumulate_in_hour_order() {
        let payload = json!({
            "data": { "aggregationResult": { "aggregations": [
                {
                    "referenceID": "hourlyConsumption",
                    "results": [
                        { "date": "01022024", "binValues": [
                            { "name": "h2", "value": 0.4 },
                            { "name": "h1", "value": 0.3 }
                        ] }
                    ]
                }
            ] } }
        });

        let days = PortalParser::parse_hourly(&payload).unwrap();
        let points = &days[0].points;
        assert!(points[0].timestamp < points[1].timestamp);
        assert!((points[0].cumulative_kwh - 0.3).abs() < 1e-9);
        assert!((points[1].cumulative_kwh - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_bad_bin_name_is_an_error() {
        let payload = json!({
            "data": { "aggregationResult": { "aggregations": [
                {
                    "referenceID": "hourlyConsumption",
                    "results": [
                        { "date": "01022024", "binValues": [ { "name": "x9", "value": 1.0 } ] }
                    ]
                }
            ] } }
        });
        assert!(PortalParser::parse_hourly(&payload).is_err());
    }
}
