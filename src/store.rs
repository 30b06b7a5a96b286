//! Statistics Store
//!
//! The dashboard's time-series database is an external collaborator; all this
//! tool ever needs from it is "read a whole named series", "read the newest
//! point", and "upsert points at given timestamps". [`StatisticsStore`]
//! captures exactly that surface, and [`VersionMarker`] captures the stored
//! schema-version flag that gates the one-time historical repair. The repair
//! and import engines depend only on these traits.
//!
//! [`JsonFileStore`] is the bundled implementation: one JSON document per
//! statistic id under `<data_dir>/series/`, plus a `meta.json` holding the
//! schema version. Files are replaced via write-then-rename so a crashed
//! write never leaves a half-written series behind. It is deliberately plain;
//! it exists so the tool runs end-to-end, not to be a database.

use crate::models::StatPoint;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Schema version of a store that has never been migrated.
pub const INITIAL_SCHEMA_VERSION: u32 = 1;

pub trait StatisticsStore {
    /// All points of a series, ordered by timestamp. Unknown ids yield an
    /// empty series.
    fn read_all(&self, statistic_id: &str) -> Result<Vec<StatPoint>>;

    /// The most recent point of a series, if any.
    fn last_point(&self, statistic_id: &str) -> Result<Option<StatPoint>>;

    /// Insert or overwrite points at their timestamps. Returns the number of
    /// points written.
    fn upsert(&self, statistic_id: &str, points: &[StatPoint]) -> Result<usize>;
}

pub trait VersionMarker {
    fn schema_version(&self) -> Result<u32>;
    fn set_schema_version(&self, version: u32) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SeriesFile {
    #[serde(rename = "statisticId")]
    statistic_id: String,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
    points: Vec<StatPoint>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaFile {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if missing) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("series"))
            .with_context(|| format!("Failed to create store directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn series_path(&self, statistic_id: &str) -> PathBuf {
        self.root.join("series").join(format!("{}.json", statistic_id))
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    fn load_series(&self, statistic_id: &str) -> Result<Vec<StatPoint>> {
        let path = self.series_path(statistic_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read series file: {}", path.display()))?;
        let file: SeriesFile = serde_json::from_str(&content)
            .with_context(|| format!("Malformed series file: {}", path.display()))?;
        Ok(file.points)
    }

    fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
        let content = serde_json::to_string_pretty(value).context("Failed to serialize store file")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write store file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace store file: {}", path.display()))?;
        Ok(())
    }
}

impl StatisticsStore for JsonFileStore {
    fn read_all(&self, statistic_id: &str) -> Result<Vec<StatPoint>> {
        self.load_series(statistic_id)
    }

    fn last_point(&self, statistic_id: &str) -> Result<Option<StatPoint>> {
        Ok(self.load_series(statistic_id)?.into_iter().last())
    }

    fn upsert(&self, statistic_id: &str, points: &[StatPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut by_start: BTreeMap<DateTime<Utc>, f64> = self
            .load_series(statistic_id)?
            .into_iter()
            .map(|p| (p.start, p.sum))
            .collect();

        for point in points {
            by_start.insert(point.start, point.sum);
        }

        let file = SeriesFile {
            statistic_id: statistic_id.to_string(),
            updated_at: Utc::now(),
            points: by_start
                .into_iter()
                .map(|(start, sum)| StatPoint::new(start, sum))
                .collect(),
        };
        Self::write_json(&self.series_path(statistic_id), &file)?;

        debug!(
            statistic_id = statistic_id,
            written = points.len(),
            total = file.points.len(),
            "Upserted statistics"
        );
        Ok(points.len())
    }
}

impl VersionMarker for JsonFileStore {
    fn schema_version(&self) -> Result<u32> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(INITIAL_SCHEMA_VERSION);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read store metadata: {}", path.display()))?;
        let meta: MetaFile = serde_json::from_str(&content)
            .with_context(|| format!("Malformed store metadata: {}", path.display()))?;
        Ok(meta.schema_version.unwrap_or(INITIAL_SCHEMA_VERSION))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        Self::write_json(
            &self.meta_path(),
            &MetaFile {
                schema_version: Some(version),
            },
        )
    }
}
