//! Pre-repair Snapshot Artifacts
//!
//! Before the historical repair rewrites anything, the affected series are
//! serialized to a standalone JSON artifact. The artifact is self-describing
//! (schema version, creation time, metering point, statistic ids, the
//! original points per metric) so it can be validated and restored offline,
//! without any of this tool's runtime state. File names derive
//! deterministically from the POD and the pre-repair schema version, so a
//! given migration always produces the same artifact path.
//!
//! The store itself offers no transactionality; this artifact is the only
//! recovery path if the correction write dies halfway. It is flushed to disk
//! and renamed into place before the first store mutation.

use crate::models::{normalize_pod, StatPoint};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use glob::glob;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Artifact format version.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub version: u32,
    pub backup_timestamp: DateTime<Utc>,
    pub pod: String,
    pub statistic_id_consumption: String,
    pub statistic_id_cost: Option<String>,
    pub original_statistics: Vec<StatPoint>,
    #[serde(default)]
    pub original_cost_statistics: Vec<StatPoint>,
}

impl BackupArtifact {
    pub fn new(
        pod: &str,
        statistic_id_consumption: &str,
        statistic_id_cost: Option<&str>,
        original_statistics: Vec<StatPoint>,
        original_cost_statistics: Vec<StatPoint>,
    ) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION,
            backup_timestamp: Utc::now(),
            pod: pod.to_string(),
            statistic_id_consumption: statistic_id_consumption.to_string(),
            statistic_id_cost: statistic_id_cost.map(str::to_string),
            original_statistics,
            original_cost_statistics,
        }
    }

    /// Deterministic artifact file name for a metering point and the schema
    /// version being migrated away from.
    pub fn file_name(pod: &str, from_schema_version: u32) -> String {
        format!(
            "grid_usage_backup_{}_v{}.json",
            normalize_pod(pod),
            from_schema_version
        )
    }

    /// Serialize the artifact into `backup_dir`, flushing file contents to
    /// disk before renaming it into place. Returns the final path.
    pub fn write(&self, backup_dir: &Path, from_schema_version: u32) -> Result<PathBuf> {
        fs::create_dir_all(backup_dir).with_context(|| {
            format!("Failed to create backup directory: {}", backup_dir.display())
        })?;

        let path = backup_dir.join(Self::file_name(&self.pod, from_schema_version));
        let tmp = path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize backup artifact")?;

        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create backup file: {}", tmp.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write backup file: {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to flush backup file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to finalize backup file: {}", path.display()))?;

        info!(path = %path.display(), records = self.original_statistics.len(), "Created pre-repair backup");
        Ok(path)
    }

    /// Load an artifact from disk and check its structure.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Backup file not found or unreadable: {}", path.display()))?;
        let artifact: BackupArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in backup file: {}", path.display()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Structural validation, usable without touching the store.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > BACKUP_FORMAT_VERSION {
            bail!("Unsupported backup format version: {}", self.version);
        }
        if self.pod.is_empty() {
            bail!("Backup is missing the metering point identifier");
        }
        if self.statistic_id_consumption.is_empty() {
            bail!("Backup is missing the consumption statistic id");
        }
        if self.original_statistics.is_empty() {
            bail!("Backup holds no statistics records");
        }
        if !self.original_cost_statistics.is_empty() && self.statistic_id_cost.is_none() {
            bail!("Backup holds cost records but no cost statistic id");
        }
        Ok(())
    }
}

/// All backup artifacts present in `backup_dir`, sorted by path.
pub fn find_backups(backup_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = backup_dir.join("grid_usage_backup_*.json");
    let mut paths: Vec<PathBuf> = glob(&pattern.to_string_lossy())
        .context("Invalid backup search pattern")?
        .flatten()
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn pt(h: u32, sum: f64) -> StatPoint {
        StatPoint::new(Utc.with_ymd_and_hms(2024, 2, 1, h, 0, 0).unwrap(), sum)
    }

    fn sample() -> BackupArtifact {
        BackupArtifact::new(
            "IT001-E98",
            "grid_it001_e98_consumption",
            Some("grid_it001_e98_kw_cost"),
            vec![pt(0, 1.0), pt(1, 2.0)],
            vec![pt(0, 0.33), pt(1, 0.66)],
        )
    }

    #[test]
    fn test_file_name_is_deterministic() {
        assert_eq!(
            BackupArtifact::file_name("IT001-E98", 1),
            "grid_usage_backup_it001_e98_v1.json"
        );
    }

    #[test]
    fn test_write_load_roundtrip() {
        let dir = tempdir().unwrap();
        let artifact = sample();
        let path = artifact.write(dir.path(), 1).unwrap();

        let loaded = BackupArtifact::load(&path).unwrap();
        assert_eq!(loaded.pod, artifact.pod);
        assert_eq!(loaded.original_statistics, artifact.original_statistics);
        assert_eq!(
            loaded.original_cost_statistics,
            artifact.original_cost_statistics
        );
    }

    #[test]
    fn test_validate_rejects_incomplete_artifacts() {
        let mut artifact = sample();
        artifact.statistic_id_consumption.clear();
        assert!(artifact.validate().is_err());

        let mut artifact = sample();
        artifact.original_statistics.clear();
        assert!(artifact.validate().is_err());

        let mut artifact = sample();
        artifact.version = 99;
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn test_find_backups_matches_pattern() {
        let dir = tempdir().unwrap();
        sample().write(dir.path(), 1).unwrap();
        std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

        let found = find_backups(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("grid_usage_backup_"));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid_usage_backup_x_v1.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(BackupArtifact::load(&path).is_err());
    }
}
