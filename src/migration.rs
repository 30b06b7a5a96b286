//! One-time Statistics Migration
//!
//! Version 1 of this tool corrupted the stored cumulative series at month
//! boundaries (see [`crate::repair`]). This module runs the one-time fix:
//! gated on the store's schema-version marker, it reads the full history,
//! snapshots it to a backup artifact, writes the corrected series back, and
//! advances the marker so the repair never runs twice.
//!
//! The run is synchronous and single-threaded; the store is assumed to be
//! ours alone while it runs. Phases progress strictly
//! `NotMigrated -> BackedUp -> Corrected -> Committed`:
//!
//! - failure before `BackedUp` leaves the store untouched and the migration
//!   pending, so the next startup retries it;
//! - failure after the write phase started is recoverable only from the
//!   backup artifact — there is no automatic rollback, the error names the
//!   artifact path instead.
//!
//! A migration error never takes the importer down with it; callers log it
//! and continue collecting new data.

use crate::backup::BackupArtifact;
use crate::models::{BoundaryJump, MeterIds};
use crate::repair::{repair_pair, validate_ordering};
use crate::store::{StatisticsStore, VersionMarker};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Schema version written once the historical repair has been applied.
pub const TARGET_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationPhase {
    NotMigrated,
    BackedUp,
    Corrected,
    Committed,
}

/// What a migration run did, for logging and the CLI report.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub skipped: bool,
    pub phase: MigrationPhase,
    #[serde(rename = "fromVersion")]
    pub from_version: u32,
    #[serde(rename = "toVersion")]
    pub to_version: u32,
    pub anomalies: Vec<BoundaryJump>,
    #[serde(rename = "consumptionRecords")]
    pub consumption_records: usize,
    #[serde(rename = "costRecords")]
    pub cost_records: usize,
    #[serde(rename = "backupPath")]
    pub backup_path: Option<PathBuf>,
}

pub struct StatisticsMigrator<'a> {
    store: &'a dyn StatisticsStore,
    versions: &'a dyn VersionMarker,
    backup_dir: &'a Path,
    ids: MeterIds,
    anomaly_threshold: f64,
}

impl<'a> StatisticsMigrator<'a> {
    pub fn new(
        store: &'a dyn StatisticsStore,
        versions: &'a dyn VersionMarker,
        backup_dir: &'a Path,
        ids: MeterIds,
        anomaly_threshold: f64,
    ) -> Self {
        Self {
            store,
            versions,
            backup_dir,
            ids,
            anomaly_threshold,
        }
    }

    /// Inspect the stored history without writing anything: the boundary
    /// jumps the repair would fix, or an error if the series is unreadable.
    pub fn detect(&self) -> Result<Vec<BoundaryJump>> {
        let consumption = self
            .store
            .read_all(&self.ids.consumption)
            .context("Failed to read consumption statistics")?;
        validate_ordering(&consumption)?;
        Ok(crate::repair::detect_jumps(
            &consumption,
            self.anomaly_threshold,
        ))
    }

    /// Run the migration if the store's schema version is still behind.
    pub fn run(&self) -> Result<MigrationReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("migration", run_id = %run_id, pod = %self.ids.pod);
        let _guard = span.enter();

        let from_version = self
            .versions
            .schema_version()
            .context("Failed to read schema version marker")?;

        if from_version >= TARGET_SCHEMA_VERSION {
            info!(from_version, "Statistics already migrated, skipping");
            return Ok(MigrationReport {
                skipped: true,
                phase: MigrationPhase::Committed,
                from_version,
                to_version: from_version,
                anomalies: Vec::new(),
                consumption_records: 0,
                cost_records: 0,
                backup_path: None,
            });
        }

        info!(
            phase = ?MigrationPhase::NotMigrated,
            from_version,
            to_version = TARGET_SCHEMA_VERSION,
            statistic_id = %self.ids.consumption,
            "Starting statistics migration"
        );

        // Read phase: any failure here leaves the store untouched.
        let consumption = self
            .store
            .read_all(&self.ids.consumption)
            .context("Failed to read consumption statistics")?;

        if consumption.is_empty() {
            warn!(statistic_id = %self.ids.consumption, "No statistics found, nothing to repair");
            self.commit_version()?;
            return Ok(MigrationReport {
                skipped: false,
                phase: MigrationPhase::Committed,
                from_version,
                to_version: TARGET_SCHEMA_VERSION,
                anomalies: Vec::new(),
                consumption_records: 0,
                cost_records: 0,
                backup_path: None,
            });
        }

        validate_ordering(&consumption).context("Consumption series is malformed")?;

        let cost = self
            .store
            .read_all(&self.ids.cost)
            .context("Failed to read cost statistics")?;
        if !cost.is_empty() {
            validate_ordering(&cost).context("Cost series is malformed")?;
        }

        // Snapshot phase: the backup must be durable before the first write.
        let artifact = BackupArtifact::new(
            &self.ids.pod,
            &self.ids.consumption,
            (!cost.is_empty()).then_some(self.ids.cost.as_str()),
            consumption.clone(),
            cost.clone(),
        );
        let backup_path = artifact
            .write(self.backup_dir, from_version)
            .context("Backup write failed, aborting before any correction")?;
        info!(phase = ?MigrationPhase::BackedUp, backup = %backup_path.display(), "Snapshot durable");

        // Correction phase, wholly in memory.
        let (fixed_consumption, fixed_cost, anomalies) =
            repair_pair(&consumption, &cost, self.anomaly_threshold);
        info!(phase = ?MigrationPhase::Corrected, anomalies = anomalies.len(), "Correction computed");

        for jump in &anomalies {
            info!(
                period = ?jump.period,
                jump_kwh = jump.jump,
                "Found anomalous month-boundary jump"
            );
        }
        if anomalies.is_empty() {
            info!("No anomalous jumps found, repair is a no-op");
        }

        // Write phase: from here on the backup artifact is the recovery path.
        let consumption_records = self
            .store
            .upsert(&self.ids.consumption, &fixed_consumption)
            .with_context(|| {
                format!(
                    "Correction write failed partway; restore from backup at {}",
                    backup_path.display()
                )
            })?;

        let cost_records = if fixed_cost.is_empty() {
            0
        } else {
            self.store
                .upsert(&self.ids.cost, &fixed_cost)
                .with_context(|| {
                    format!(
                        "Cost correction write failed; consumption already rewritten, restore from backup at {}",
                        backup_path.display()
                    )
                })?
        };

        self.commit_version()?;

        info!(
            phase = ?MigrationPhase::Committed,
            consumption_records,
            cost_records,
            anomalies = anomalies.len(),
            "Statistics migration complete"
        );

        Ok(MigrationReport {
            skipped: false,
            phase: MigrationPhase::Committed,
            from_version,
            to_version: TARGET_SCHEMA_VERSION,
            anomalies,
            consumption_records,
            cost_records,
            backup_path: Some(backup_path),
        })
    }

    fn commit_version(&self) -> Result<()> {
        self.versions
            .set_schema_version(TARGET_SCHEMA_VERSION)
            .context("Failed to advance schema version marker")
    }
}
