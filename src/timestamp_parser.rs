use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Handles parsing the date encodings used in provider payloads
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a provider day key (`DDMMYYYY`) into a date.
    pub fn parse_day(day: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(day, "%d%m%Y")
            .with_context(|| format!("Failed to parse day key: {}", day))
    }

    /// Parse an hourly bin name (`h1` through `h24`) into its 1-based hour.
    pub fn parse_hour_bin(name: &str) -> Result<u32> {
        let digits = name
            .strip_prefix('h')
            .with_context(|| format!("Unexpected hourly bin name: {}", name))?;
        let hour: u32 = digits
            .parse()
            .with_context(|| format!("Unexpected hourly bin name: {}", name))?;
        if !(1..=24).contains(&hour) {
            bail!("Hourly bin out of range: {}", name);
        }
        Ok(hour)
    }

    /// Timestamp of an hourly bin: midnight of the day plus `hour - 1` hours,
    /// so `h1` covers 00:00-01:00.
    pub fn bin_timestamp(date: NaiveDate, hour: u32) -> Result<DateTime<Utc>> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .with_context(|| format!("Invalid date: {}", date))?;
        Ok(Utc.from_utc_datetime(&midnight) + chrono::Duration::hours(i64::from(hour) - 1))
    }
}
