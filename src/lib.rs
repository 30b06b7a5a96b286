//! Grid Usage Library
//!
//! A Rust library for importing hourly utility-meter consumption into a local
//! time-series statistics store, deriving a parallel cost series, and
//! repairing historical cumulative statistics corrupted by month-boundary
//! resets.
//!
//! ## Core Features
//!
//! - **Incremental import**: Parses the provider's hourly aggregation payload
//!   and appends only what the store has not seen, continuing the stored
//!   running total across runs
//! - **Cumulative repair**: A pure, offset-folding transform that removes
//!   anomalous month-boundary jumps while preserving every intra-month delta
//! - **One-time migration**: Version-gated repair of the stored history with
//!   a mandatory pre-repair backup artifact and an idempotent schema marker
//! - **Reports**: Daily/monthly consumption and cost tables plus a boundary
//!   verification scan, as colored terminal output or JSON
//!
//! ## Architecture Overview
//!
//! - [`models`] - Core data structures for readings, stored points, and reports
//! - [`parser`] - Provider payload parsing into hourly readings
//! - [`source`] - Where payloads come from (portal endpoint or file)
//! - [`store`] - The statistics-store trait and the bundled JSON file store
//! - [`repair`] - The cumulative-series repair fold and jump detection
//! - [`backup`] - Pre-repair snapshot artifacts
//! - [`migration`] - The version-gated one-time migration engine
//! - [`importer`] - Orchestrates fetch, parse, rebase, and store
//! - [`display`] - Report aggregation and output formatting
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Points
//!
//! [`UsageImporter`] drives an import run against any
//! [`source::ConsumptionSource`]; [`StatisticsMigrator`] runs the one-time
//! historical repair against any [`store::StatisticsStore`].
//!
//! ```rust,no_run
//! use grid_usage::{MeterIds, StatisticsMigrator, store::JsonFileStore};
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = JsonFileStore::open("/var/lib/grid-usage")?;
//! let ids = MeterIds::for_pod("IT001E9876543210");
//! let migrator = StatisticsMigrator::new(
//!     &store,
//!     &store,
//!     std::path::Path::new("/var/lib/grid-usage/backups"),
//!     ids,
//!     1000.0,
//! );
//! let report = migrator.run()?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config;
pub mod display;
pub mod importer;
pub mod logging;
pub mod migration;
pub mod models;
pub mod parser;
pub mod repair;
pub mod source;
pub mod store;
pub mod timestamp_parser;

pub use display::DisplayManager;
pub use importer::UsageImporter;
pub use migration::{StatisticsMigrator, TARGET_SCHEMA_VERSION};
pub use models::*;
