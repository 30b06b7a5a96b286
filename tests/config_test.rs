//! Config file loading tests (the env-override paths are covered next to the
//! config module itself).

#![cfg(feature = "basic")]

use grid_usage::config::Config;
use std::fs;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[logging]
level = "DEBUG"
format = "json"
output = "console"

[repair]
anomaly_threshold_kwh = 800.0
typical_daily_min_kwh = 3.0
typical_daily_max_kwh = 40.0

[pricing]
price_per_kwh = 0.28
currency = "EUR"

[source]
endpoint = "https://portal.example/consumption"
pod = "IT001E9876543210"
user_number = "12345"
timeout_secs = 20

[paths]
data_dir = "/tmp/grid-usage-test/data"
backup_dir = "/tmp/grid-usage-test/backups"
log_directory = "/tmp/grid-usage-test/logs"
"#;

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grid-usage.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.logging.level, "DEBUG");
    assert_eq!(config.repair.anomaly_threshold_kwh, 800.0);
    assert_eq!(config.pricing.price_per_kwh, 0.28);
    assert_eq!(config.source.pod, "IT001E9876543210");
    assert_eq!(config.source.user_number.as_deref(), Some("12345"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_file_rejects_bad_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grid-usage.toml");
    fs::write(&path, "not valid toml [").unwrap();

    assert!(Config::load_from_file(&path).is_err());
}

#[test]
fn test_load_from_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(Config::load_from_file(&dir.path().join("nope.toml")).is_err());
}

#[test]
fn test_roundtrip_through_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let mut config = Config::default();
    config.repair.anomaly_threshold_kwh = 1234.0;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.repair.anomaly_threshold_kwh, 1234.0);
}
