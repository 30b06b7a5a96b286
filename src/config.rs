//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Historical repair configuration
    pub repair: RepairConfig,

    /// Cost series configuration
    pub pricing: PricingConfig,

    /// Provider payload source configuration
    pub source: SourceConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

/// Heuristics for the cumulative-series repair.
///
/// The threshold separates reset artifacts from real consumption at month
/// boundaries; the typical daily band is only used by verify to point out
/// implausible days. Both are empirical and tunable, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    pub anomaly_threshold_kwh: f64,
    pub typical_daily_min_kwh: f64,
    pub typical_daily_max_kwh: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub price_per_kwh: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    pub pod: String,
    pub user_number: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            logging: LoggingConfig {
                level: "ERROR".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            repair: RepairConfig {
                anomaly_threshold_kwh: 1000.0,
                typical_daily_min_kwh: 5.0,
                typical_daily_max_kwh: 30.0,
            },
            pricing: PricingConfig {
                price_per_kwh: 0.33,
                currency: "EUR".to_string(),
            },
            source: SourceConfig {
                endpoint: String::new(),
                pod: String::new(),
                user_number: None,
                timeout_secs: 30,
            },
            paths: PathsConfig {
                data_dir: home.join(".grid-usage"),
                backup_dir: home.join(".grid-usage").join("backups"),
                log_directory: PathBuf::from("logs"),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        #[cfg(feature = "basic")]
        {
            let config_paths = [
                PathBuf::from("grid-usage.toml"),
                PathBuf::from(".grid-usage.toml"),
                dirs::config_dir()
                    .map(|d| d.join("grid-usage").join("config.toml"))
                    .unwrap_or_default(),
            ];

            for path in &config_paths {
                if path.exists() {
                    info!(config_file = %path.display(), "Loading configuration from file");
                    config = Self::load_from_file(path)?;
                    break;
                }
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    #[cfg(feature = "basic")]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Repair overrides
        if let Ok(val) = env::var("GRID_USAGE_ANOMALY_THRESHOLD_KWH") {
            self.repair.anomaly_threshold_kwh = val
                .parse()
                .context("Invalid GRID_USAGE_ANOMALY_THRESHOLD_KWH")?;
        }
        if let Ok(val) = env::var("GRID_USAGE_TYPICAL_DAILY_MIN_KWH") {
            self.repair.typical_daily_min_kwh = val
                .parse()
                .context("Invalid GRID_USAGE_TYPICAL_DAILY_MIN_KWH")?;
        }
        if let Ok(val) = env::var("GRID_USAGE_TYPICAL_DAILY_MAX_KWH") {
            self.repair.typical_daily_max_kwh = val
                .parse()
                .context("Invalid GRID_USAGE_TYPICAL_DAILY_MAX_KWH")?;
        }

        // Pricing overrides
        if let Ok(val) = env::var("GRID_USAGE_PRICE_PER_KWH") {
            self.pricing.price_per_kwh =
                val.parse().context("Invalid GRID_USAGE_PRICE_PER_KWH")?;
        }
        if let Ok(val) = env::var("GRID_USAGE_CURRENCY") {
            self.pricing.currency = val;
        }

        // Source overrides
        if let Ok(val) = env::var("GRID_USAGE_ENDPOINT") {
            self.source.endpoint = val;
        }
        if let Ok(val) = env::var("GRID_USAGE_POD") {
            self.source.pod = val;
        }
        if let Ok(val) = env::var("GRID_USAGE_USER_NUMBER") {
            self.source.user_number = Some(val);
        }
        if let Ok(val) = env::var("GRID_USAGE_TIMEOUT_SECS") {
            self.source.timeout_secs = val.parse().context("Invalid GRID_USAGE_TIMEOUT_SECS")?;
        }

        // Path overrides
        if let Ok(val) = env::var("GRID_USAGE_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("GRID_USAGE_BACKUP_DIR") {
            self.paths.backup_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("GRID_USAGE_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.repair.anomaly_threshold_kwh <= 0.0 {
            return Err(anyhow::anyhow!(
                "Anomaly threshold must be greater than 0 kWh, got {}",
                self.repair.anomaly_threshold_kwh
            ));
        }

        if self.repair.typical_daily_min_kwh >= self.repair.typical_daily_max_kwh {
            return Err(anyhow::anyhow!(
                "Typical daily band is empty: min {} >= max {}",
                self.repair.typical_daily_min_kwh,
                self.repair.typical_daily_max_kwh
            ));
        }

        if self.repair.anomaly_threshold_kwh <= self.repair.typical_daily_max_kwh {
            warn!(
                threshold_kwh = self.repair.anomaly_threshold_kwh,
                "Anomaly threshold sits inside the typical daily band, normal days will be flagged"
            );
        }

        if self.pricing.price_per_kwh < 0.0 {
            return Err(anyhow::anyhow!(
                "Price per kWh cannot be negative, got {}",
                self.pricing.price_per_kwh
            ));
        }

        if self.source.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Source timeout must be greater than 0"));
        }

        // Validate paths exist (create if needed)
        if !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Save current configuration to file
    #[cfg(feature = "basic")]
    #[allow(dead_code)]
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config::load().expect("Failed to load configuration"))
}
