use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use grid_usage::backup::{find_backups, BackupArtifact};
use grid_usage::config::get_config;
use grid_usage::display::DisplayManager;
use grid_usage::importer::UsageImporter;
use grid_usage::migration::StatisticsMigrator;
use grid_usage::models::MeterIds;
use grid_usage::repair::boundary_jumps;
use grid_usage::source::FileSource;
use grid_usage::store::{JsonFileStore, StatisticsStore, VersionMarker, INITIAL_SCHEMA_VERSION};

#[derive(Parser)]
#[command(name = "grid-usage")]
#[command(about = "Fast Rust importer for utility-meter consumption statistics with historical repair")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest consumption payload and store new points
    Import {
        /// Read the payload from a file instead of the portal endpoint
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show daily consumption and cost
    Daily {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Show last N entries
        #[arg(long)]
        limit: Option<usize>,
        /// Start date filter (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// End date filter (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
    },
    /// Show monthly consumption and cost
    Monthly {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Show last N entries
        #[arg(long)]
        limit: Option<usize>,
        /// Start date filter (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// End date filter (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
    },
    /// Check the stored series for anomalous month-boundary jumps
    Verify {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Run the one-time historical statistics repair
    Repair {
        /// Only report what would be fixed, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List pre-repair backup artifacts
    Backups {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Restore original statistics from a backup artifact
    Restore {
        /// Path to the backup JSON file
        backup_file: PathBuf,
        /// Only validate the backup file, do not restore
        #[arg(long)]
        validate_only: bool,
        /// Also lower the schema version marker so the repair can run again
        #[arg(long)]
        reset_version: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    grid_usage::logging::init_logging();

    let json = match &cli.command {
        Some(Commands::Import { json, .. })
        | Some(Commands::Daily { json, .. })
        | Some(Commands::Monthly { json, .. })
        | Some(Commands::Verify { json })
        | Some(Commands::Repair { json, .. })
        | Some(Commands::Backups { json }) => *json,
        _ => false,
    };

    let result = match cli.command.unwrap_or(Commands::Daily {
        json: false,
        limit: None,
        since: None,
        until: None,
    }) {
        Commands::Import { from_file, json } => run_import(from_file, json).await,
        Commands::Daily {
            json,
            limit,
            since,
            until,
        } => run_report("daily", json, limit, since, until),
        Commands::Monthly {
            json,
            limit,
            since,
            until,
        } => run_report("monthly", json, limit, since, until),
        Commands::Verify { json } => run_verify(json),
        Commands::Repair { dry_run, json } => run_repair(dry_run, json),
        Commands::Backups { json } => run_backups(json),
        Commands::Restore {
            backup_file,
            validate_only,
            reset_version,
        } => run_restore(&backup_file, validate_only, reset_version),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

fn open_store() -> Result<JsonFileStore> {
    let config = get_config();
    JsonFileStore::open(&config.paths.data_dir)
}

fn meter_ids() -> Result<MeterIds> {
    let config = get_config();
    if config.source.pod.is_empty() {
        bail!("No metering point configured (set source.pod or GRID_USAGE_POD)");
    }
    Ok(MeterIds::for_pod(&config.source.pod))
}

async fn run_import(from_file: Option<PathBuf>, json: bool) -> Result<()> {
    let config = get_config();
    let store = open_store()?;
    let ids = meter_ids()?;

    // One-time historical repair, gated on the schema marker. A failure here
    // must never block ongoing collection.
    let migrator = StatisticsMigrator::new(
        &store,
        &store,
        &config.paths.backup_dir,
        ids.clone(),
        config.repair.anomaly_threshold_kwh,
    );
    if let Err(e) = migrator.run() {
        tracing::error!(error = %e, "Statistics migration failed, continuing with import");
        if !json {
            eprintln!("Warning: statistics migration failed: {e:#}");
        }
    }

    let importer = UsageImporter::new(&store, ids, config.pricing.price_per_kwh);
    let summary = match from_file {
        Some(path) => importer.import(&FileSource::new(path)).await?,
        None => {
            #[cfg(feature = "portal")]
            {
                let client = grid_usage::source::PortalClient::from_config(&config.source)?;
                importer.import(&client).await?
            }
            #[cfg(not(feature = "portal"))]
            {
                bail!("Built without portal support, use --from-file");
            }
        }
    };

    DisplayManager::new().display_import_summary(&summary, json);
    Ok(())
}

fn run_report(
    command: &str,
    json: bool,
    limit: Option<usize>,
    since: Option<String>,
    until: Option<String>,
) -> Result<()> {
    let since = since.map(|s| parse_date_arg(&s, json)).transpose()?;
    let until = until.map(|s| parse_date_arg(&s, json)).transpose()?;

    let config = get_config();
    let store = open_store()?;
    let ids = meter_ids()?;

    let consumption = store.read_all(&ids.consumption)?;
    let cost = store.read_all(&ids.cost)?;

    let display = DisplayManager::new();
    let mut daily = display.daily_rows(&consumption, &cost, config.pricing.price_per_kwh);

    if since.is_some() || until.is_some() {
        daily.retain(|row| {
            since.as_ref().map_or(true, |s| row.date.as_str() >= s.as_str())
                && until.as_ref().map_or(true, |u| row.date.as_str() <= u.as_str())
        });
    }

    match command {
        "daily" => display.display_daily(&daily, limit, &config.pricing.currency, json),
        "monthly" => {
            let monthly = display.monthly_rows(&daily);
            display.display_monthly(&monthly, limit, &config.pricing.currency, json)
        }
        _ => bail!("Unknown command: {}", command),
    }
    Ok(())
}

fn run_verify(json: bool) -> Result<()> {
    let config = get_config();
    let store = open_store()?;
    let ids = meter_ids()?;

    let consumption = store
        .read_all(&ids.consumption)
        .context("Failed to read consumption statistics")?;
    let jumps = boundary_jumps(&consumption);

    let display = DisplayManager::new();
    let band = (
        config.repair.typical_daily_min_kwh,
        config.repair.typical_daily_max_kwh,
    );
    let daily = display.daily_rows(&consumption, &[], config.pricing.price_per_kwh);
    let outliers = display.daily_outliers(&daily, band);

    display.display_verify(
        &jumps,
        config.repair.anomaly_threshold_kwh,
        &outliers,
        band,
        json,
    );
    Ok(())
}

fn run_repair(dry_run: bool, json: bool) -> Result<()> {
    let config = get_config();
    let store = open_store()?;
    let ids = meter_ids()?;

    let migrator = StatisticsMigrator::new(
        &store,
        &store,
        &config.paths.backup_dir,
        ids,
        config.repair.anomaly_threshold_kwh,
    );

    if dry_run {
        let jumps = migrator.detect()?;
        if json {
            let output = serde_json::json!({ "wouldFix": jumps });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if jumps.is_empty() {
            println!("No anomalous boundary jumps, repair would be a no-op.");
        } else {
            for jump in &jumps {
                println!(
                    "Would fix {:04}-{:02}: jump of {:+.2} kWh",
                    jump.period.0, jump.period.1, jump.jump
                );
            }
        }
        return Ok(());
    }

    let report = migrator.run()?;
    DisplayManager::new().display_migration_report(&report, json);
    Ok(())
}

fn run_backups(json: bool) -> Result<()> {
    let config = get_config();
    let paths = find_backups(&config.paths.backup_dir)?;

    if json {
        let entries: Vec<serde_json::Value> = paths
            .iter()
            .filter_map(|path| {
                let artifact = BackupArtifact::load(path).ok()?;
                Some(serde_json::json!({
                    "path": path,
                    "pod": artifact.pod,
                    "createdAt": artifact.backup_timestamp,
                    "records": artifact.original_statistics.len(),
                }))
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if paths.is_empty() {
        println!(
            "No backup artifacts in {}.",
            config.paths.backup_dir.display()
        );
        return Ok(());
    }

    for path in &paths {
        match BackupArtifact::load(path) {
            Ok(artifact) => println!(
                "{}  pod {}  {} record(s)  created {}",
                path.display(),
                artifact.pod,
                artifact.original_statistics.len(),
                artifact.backup_timestamp.to_rfc3339()
            ),
            Err(e) => println!("{}  (unreadable: {})", path.display(), e),
        }
    }
    Ok(())
}

fn run_restore(backup_file: &std::path::Path, validate_only: bool, reset_version: bool) -> Result<()> {
    let artifact = BackupArtifact::load(backup_file)?;

    println!("Backup file valid");
    println!("  POD:     {}", artifact.pod);
    println!("  Created: {}", artifact.backup_timestamp.to_rfc3339());
    println!("  Records: {}", artifact.original_statistics.len());

    if validate_only {
        return Ok(());
    }

    let store = open_store()?;
    let written = store.upsert(&artifact.statistic_id_consumption, &artifact.original_statistics)?;
    println!(
        "Restored {} consumption record(s) to {}.",
        written, artifact.statistic_id_consumption
    );

    if let Some(cost_id) = &artifact.statistic_id_cost {
        if !artifact.original_cost_statistics.is_empty() {
            let written = store.upsert(cost_id, &artifact.original_cost_statistics)?;
            println!("Restored {} cost record(s) to {}.", written, cost_id);
        }
    }

    if reset_version {
        store.set_schema_version(INITIAL_SCHEMA_VERSION)?;
        println!("Schema version reset, the repair will run again on next import.");
    } else {
        println!("Note: the schema version marker is still at its current value;");
        println!("run with --reset-version if the repair should be applied again.");
    }
    Ok(())
}

fn parse_date_arg(value: &str, json: bool) -> Result<String> {
    match chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Ok(date.format("%Y-%m-%d").to_string()),
        Err(_) => {
            if !json {
                eprintln!("Invalid date format: {}. Use YYYY-MM-DD", value);
            }
            process::exit(1);
        }
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("Error: {e:#}");
    }
    process::exit(1);
}
