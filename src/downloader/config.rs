//! Fetch configuration
//!
//! Loaded from a TOML file (every field optional) and then overridden by CLI
//! flags. Defaults reproduce the stock setup: BTC/ETH/SOL at one minute, one
//! day per request, three years of history.

use crate::fetcher::hyperliquid::{HYPERLIQUID_BASE_URL, MAX_CANDLES_PER_REQUEST};
use crate::Interval;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::DownloadError;

/// Default instrument list
pub const DEFAULT_INSTRUMENTS: [&str; 3] = ["BTC", "ETH", "SOL"];

/// Default chunk width in hours.
/// One day of 1m candles is 1440 rows, well under the per-request cap.
pub const DEFAULT_CHUNK_HOURS: u64 = 24;

/// Default pause between successful requests (seconds)
pub const DEFAULT_API_SLEEP_SECS: f64 = 0.25;

/// Default history horizon for a series with no checkpoint (years)
pub const DEFAULT_YEARS_BACK: u32 = 3;

/// Default number of instruments picked in automatic mode
pub const DEFAULT_TOP_INSTRUMENTS: usize = 20;

/// Default HTTP request timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default total attempts per request when rate limited
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default linear backoff step (seconds)
pub const DEFAULT_BASE_DELAY_SECS: f64 = 5.0;

/// Default backoff cap (seconds), before jitter
pub const DEFAULT_MAX_DELAY_SECS: f64 = 30.0;

/// Default upper bound of the random jitter added to each backoff (ms)
pub const DEFAULT_MAX_JITTER_MS: u64 = 1_000;

/// Longest accepted history horizon (years)
pub const MAX_YEARS_BACK: u32 = 100;

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_YEAR: i64 = 365 * 24 * MS_PER_HOUR;

/// Rate-limit retry settings (`[retry]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per request, the first one included
    pub max_attempts: u32,
    /// Delay for attempt `a` is `base_delay_secs * a` ...
    pub base_delay_secs: f64,
    /// ... capped at `max_delay_secs`
    pub max_delay_secs: f64,
    /// Uniform jitter in `[0, max_jitter_ms]` added on top
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

/// Complete configuration of a fetch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Instruments to sync; empty selects the top instruments by volume
    pub instruments: Vec<String>,
    /// Intervals to sync for every instrument
    pub intervals: Vec<Interval>,
    /// Root directory of the Parquet datasets
    pub data_dir: PathBuf,
    /// Checkpoint file path
    pub checkpoint_file: PathBuf,
    /// Width of one request window in hours
    pub chunk_hours: u64,
    /// Pause after every chunk (seconds)
    pub api_sleep_secs: f64,
    /// How far back a series with no checkpoint starts (years of 365 days)
    pub years_back: u32,
    /// Number of instruments picked when `instruments` is empty
    pub top_instruments: usize,
    /// API base URL
    pub base_url: String,
    /// Per-request HTTP timeout (seconds)
    pub http_timeout_secs: u64,
    /// Rate-limit retry settings
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            instruments: DEFAULT_INSTRUMENTS.iter().map(|s| s.to_string()).collect(),
            intervals: vec![Interval::OneMinute],
            data_dir: PathBuf::from("data"),
            checkpoint_file: PathBuf::from("checkpoint.json"),
            chunk_hours: DEFAULT_CHUNK_HOURS,
            api_sleep_secs: DEFAULT_API_SLEEP_SECS,
            years_back: DEFAULT_YEARS_BACK,
            top_instruments: DEFAULT_TOP_INSTRUMENTS,
            base_url: HYPERLIQUID_BASE_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, DownloadError> {
        toml::from_str(contents).map_err(|e| DownloadError::ConfigError(e.to_string()))
    }

    /// Load a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self, DownloadError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DownloadError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            DownloadError::ConfigError(msg) => {
                DownloadError::ConfigError(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Reject settings the fetch loop cannot run with
    pub fn validate(&self) -> Result<(), DownloadError> {
        let fail = |msg: &str| Err(DownloadError::ConfigError(msg.to_string()));

        if self.intervals.is_empty() {
            return fail("intervals must not be empty");
        }
        if self.chunk_hours == 0 {
            return fail("chunk_hours must be greater than 0");
        }
        if !self.api_sleep_secs.is_finite() || self.api_sleep_secs < 0.0 {
            return fail("api_sleep_secs must be a non-negative number");
        }
        if self.years_back == 0 {
            return fail("years_back must be greater than 0");
        }
        if self.years_back > MAX_YEARS_BACK {
            return Err(DownloadError::ConfigError(format!(
                "years_back must be at most {MAX_YEARS_BACK}"
            )));
        }
        for interval in &self.intervals {
            let bars = self.chunk_width_ms() / interval.to_milliseconds();
            if bars > MAX_CANDLES_PER_REQUEST as i64 {
                return Err(DownloadError::ConfigError(format!(
                    "chunk_hours = {} spans {bars} {interval} candles, more than the \
                     {MAX_CANDLES_PER_REQUEST} one request returns",
                    self.chunk_hours
                )));
            }
        }
        if self.instruments.is_empty() && self.top_instruments == 0 {
            return fail("top_instruments must be greater than 0 when instruments is empty");
        }
        if self.instruments.iter().any(|i| i.trim().is_empty()) {
            return fail("instrument names must not be blank");
        }
        if self.http_timeout_secs == 0 {
            return fail("http_timeout_secs must be greater than 0");
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return fail("retry.max_attempts must be greater than 0");
        }
        for (name, value) in [
            ("retry.base_delay_secs", retry.base_delay_secs),
            ("retry.max_delay_secs", retry.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DownloadError::ConfigError(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        if retry.base_delay_secs > retry.max_delay_secs {
            return fail("retry.base_delay_secs must not exceed retry.max_delay_secs");
        }

        Ok(())
    }

    /// Chunk width in milliseconds, saturating on absurd values
    pub fn chunk_width_ms(&self) -> i64 {
        i64::try_from(self.chunk_hours)
            .unwrap_or(i64::MAX)
            .saturating_mul(MS_PER_HOUR)
    }

    /// History horizon in milliseconds
    pub fn horizon_ms(&self) -> i64 {
        i64::from(self.years_back).saturating_mul(MS_PER_YEAR)
    }

    /// Pause after every chunk
    pub fn api_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.api_sleep_secs)
    }

    /// HTTP request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Whether the instrument universe is picked by volume
    pub fn automatic_instruments(&self) -> bool {
        self.instruments.is_empty()
    }
}
