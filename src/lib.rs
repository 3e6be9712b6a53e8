//! # Candle Backfill Library
//!
//! Incrementally downloads historical OHLCV candles for a configurable set of
//! instruments and intervals, stores one Parquet file per series, and resumes
//! from the last durable checkpoint on every subsequent run.
//!
//! ## Features
//!
//! - **Resumable**: one checkpoint per (instrument, interval), rewritten atomically after every chunk
//! - **Chunked**: walks the bounded-range candle API in fixed-width time chunks
//! - **Rate-limit aware**: bounded linear backoff with jitter on HTTP 429, everything else fails fast
//! - **Idempotent storage**: merges deduplicate by open time and keep rows sorted
//! - **Automatic universe**: optionally picks the top instruments by daily notional volume
//!
//! ## Quick Start
//!
//! ```no_run
//! use candle_backfill::downloader::{FetchConfig, FetchExecutor};
//! use candle_backfill::fetcher::hyperliquid::HyperliquidClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::default();
//! let source = HyperliquidClient::new(&config.base_url, config.http_timeout())?;
//! let mut executor = FetchExecutor::new(source, config)?;
//! let summary = executor.run().await?;
//! println!("{} pairs synced", summary.pairs.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`resume`] - Checkpoint store (load once, atomic rewrite after every chunk)
//! - [`fetcher`] - Remote candle source trait and the Hyperliquid implementation
//! - [`downloader`] - Rate-limited client wrapper and the chunked fetch loop
//! - [`output`] - Parquet dataset merge/writer
//! - [`selector`] - Top-N instrument selection by volume
//! - [`cli`] - Command line surface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Fetch orchestration
pub mod downloader;

/// Remote candle sources
pub mod fetcher;

/// Metrics emission
pub mod metrics;

/// Dataset storage
pub mod output;

/// Checkpoint persistence
pub mod resume;

/// Instrument selection by volume
pub mod selector;

pub use resume::SeriesKey;

/// One OHLCV bar.
///
/// Open and close times are integer milliseconds since the Unix epoch and are
/// never represented any other way inside the crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Open time (Unix timestamp in milliseconds), unique within a series
    pub open_time: i64,
    /// Close time (Unix timestamp in milliseconds)
    pub close_time: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume (base asset)
    pub volume: f64,
    /// Number of trades in the bar
    pub trades: u64,
}

impl Candle {
    /// Validate candle data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.close_time < self.open_time {
            return Err(format!(
                "Close time ({}) must not precede open time ({})",
                self.close_time, self.open_time
            ));
        }

        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(format!("{name} must be finite, got {value}"));
            }
        }

        if self.high < self.low {
            return Err(format!(
                "High ({}) must be >= low ({})",
                self.high, self.low
            ));
        }

        if self.volume < 0.0 {
            return Err(format!("Volume must be non-negative, got {}", self.volume));
        }

        Ok(())
    }
}

/// Candle interval supported by the remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    #[serde(rename = "1m")]
    OneMinute,
    /// 5 minutes
    #[serde(rename = "5m")]
    FiveMinutes,
    /// 15 minutes
    #[serde(rename = "15m")]
    FifteenMinutes,
    /// 30 minutes
    #[serde(rename = "30m")]
    ThirtyMinutes,
    /// 1 hour
    #[serde(rename = "1h")]
    OneHour,
    /// 4 hours
    #[serde(rename = "4h")]
    FourHours,
    /// 1 day
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    /// All supported intervals, shortest first
    pub const ALL: [Interval; 7] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    /// Convert interval to milliseconds
    pub fn to_milliseconds(&self) -> i64 {
        match self {
            Interval::OneMinute => 60_000,
            Interval::FiveMinutes => 300_000,
            Interval::FifteenMinutes => 900_000,
            Interval::ThirtyMinutes => 1_800_000,
            Interval::OneHour => 3_600_000,
            Interval::FourHours => 14_400_000,
            Interval::OneDay => 86_400_000,
        }
    }

    /// Wire name used by the remote API and in checkpoint keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::OneMinute),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "30m" => Ok(Interval::ThirtyMinutes),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            _ => Err(format!(
                "Invalid interval: {s}. Valid options: 1m, 5m, 15m, 30m, 1h, 4h, 1d"
            )),
        }
    }
}

/// Daily notional volume for one tradable instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentVolume {
    /// Instrument identifier as used by the candle API (e.g. "BTC")
    pub name: String,
    /// Notional volume traded over the last day
    pub day_notional_volume: f64,
}
