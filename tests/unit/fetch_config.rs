//! Loading fetch configuration from disk

use candle_backfill::downloader::{DownloadError, FetchConfig};
use candle_backfill::Interval;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backfill.toml");
    std::fs::write(
        &path,
        r#"
instruments = []
top_instruments = 15
intervals = ["5m", "1h"]
data_dir = "/srv/candles"
checkpoint_file = "/srv/candles/checkpoint.json"
chunk_hours = 12
api_sleep_secs = 0.5
years_back = 1
base_url = "https://api.hyperliquid-testnet.xyz"
http_timeout_secs = 10

[retry]
max_attempts = 6
base_delay_secs = 2.0
max_delay_secs = 8.0
max_jitter_ms = 0
"#,
    )
    .unwrap();

    let config = FetchConfig::from_toml_file(&path).unwrap();
    assert!(config.automatic_instruments());
    assert_eq!(config.top_instruments, 15);
    assert_eq!(config.intervals, vec![Interval::FiveMinutes, Interval::OneHour]);
    assert_eq!(config.data_dir, PathBuf::from("/srv/candles"));
    assert_eq!(config.chunk_width_ms(), 12 * 3_600_000);
    assert_eq!(config.horizon_ms(), 365 * 86_400_000);
    assert_eq!(config.base_url, "https://api.hyperliquid-testnet.xyz");
    assert_eq!(config.retry.max_attempts, 6);
    assert_eq!(config.retry.max_jitter_ms, 0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope.toml");

    match FetchConfig::from_toml_file(&path) {
        Err(DownloadError::ConfigError(msg)) => assert!(msg.contains("nope.toml")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_syntax_error_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "chunk_hours = [").unwrap();

    match FetchConfig::from_toml_file(&path) {
        Err(DownloadError::ConfigError(msg)) => assert!(msg.contains("broken.toml")),
        other => panic!("unexpected result: {other:?}"),
    }
}
