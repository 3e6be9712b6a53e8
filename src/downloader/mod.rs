//! Fetch orchestration
//!
//! # Overview
//!
//! 1. **Configuration**: [`config::FetchConfig`] (TOML file plus CLI overrides)
//! 2. **Retrying**: [`client::RateLimitedClient`] backs off on rate limits only
//! 3. **Chunk loop**: [`executor::FetchExecutor`] walks every pair from its
//!    checkpoint (or the history horizon) to "now"
//! 4. **Reporting**: [`job::RunSummary`] and periodic [`progress`] lines
//!
//! # Quick Start
//!
//! ```no_run
//! use candle_backfill::downloader::{FetchConfig, FetchExecutor};
//! use candle_backfill::fetcher::hyperliquid::HyperliquidClient;
//! use candle_backfill::{Interval, SeriesKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig {
//!     instruments: vec!["BTC".to_string()],
//!     intervals: vec![Interval::OneHour],
//!     ..FetchConfig::default()
//! };
//! let source = HyperliquidClient::new(&config.base_url, config.http_timeout())?;
//! let mut executor = FetchExecutor::new(source, config)?;
//! let pair = executor.sync_pair(&SeriesKey::new("BTC", Interval::OneHour)).await?;
//! println!("{} chunks, checkpoint {:?}", pair.chunks, pair.final_checkpoint);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Rate limits are absorbed by the client up to the attempt budget. Anything
//! else aborts the run; checkpoints and datasets written before the failure
//! stay valid and the next run resumes from them.

pub mod client;
pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use client::RateLimitedClient;
pub use config::{FetchConfig, RetryConfig};
pub use executor::FetchExecutor;
pub use job::{PairSummary, RunSummary, SyncPhase};
pub use rate_limit::RetryPolicy;

use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::resume::ResumeError;

/// Fetch run errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Every attempt of one request was rate limited
    #[error("rate limit retries exhausted for {key} after {attempts} attempts")]
    RateLimitExhausted {
        /// Series (or request label) that gave up
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// Non-retryable remote failure
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Checkpoint load/save or run lock failure
    #[error("checkpoint error: {0}")]
    Resume(#[from] ResumeError),

    /// Dataset read/write failure
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    ConfigError(String),
}
