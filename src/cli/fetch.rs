//! Command line surface and the `fetch` command

use crate::downloader::{FetchConfig, FetchExecutor, RunSummary};
use crate::fetcher::hyperliquid::HyperliquidClient;
use crate::metrics::init_metrics;
use crate::Interval;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use super::{CliError, StatusCommand, TopCommand};

/// Incremental candle backfill CLI
#[derive(Parser, Debug)]
#[command(name = "candle-backfill")]
#[command(about = "Incrementally back-fill OHLCV candles into per-series Parquet files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file; flags override its values
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the Parquet datasets
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Checkpoint file path
    #[arg(long, global = true)]
    pub checkpoint_file: Option<PathBuf>,

    /// API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Output format (human or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,
}

impl Cli {
    /// Config file (or defaults) with the global overrides applied
    pub fn load_config(&self) -> Result<FetchConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => FetchConfig::from_toml_file(path)?,
            None => FetchConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(path) = &self.checkpoint_file {
            config.checkpoint_file = path.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every configured pair up to now
    Fetch(FetchArgs),

    /// Show checkpoint and dataset state per pair
    Status(StatusCommand),

    /// List the top instruments by daily notional volume
    Top(TopCommand),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Overrides accepted by `fetch`
#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Instruments to sync (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "auto")]
    pub instruments: Option<Vec<String>>,

    /// Pick the top instruments by daily notional volume instead of a fixed list
    #[arg(long, default_value_t = false)]
    pub auto: bool,

    /// Number of instruments picked in automatic mode
    #[arg(long)]
    pub top: Option<usize>,

    /// Intervals to sync (comma separated: 1m,5m,15m,30m,1h,4h,1d)
    #[arg(long, value_delimiter = ',')]
    pub intervals: Option<Vec<Interval>>,

    /// Request window in hours
    #[arg(long)]
    pub chunk_hours: Option<u64>,

    /// Pause after every chunk in seconds
    #[arg(long)]
    pub api_sleep_secs: Option<f64>,

    /// History horizon for series without a checkpoint, in years
    #[arg(long)]
    pub years_back: Option<u32>,

    /// Total attempts per request when rate limited (1-100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: Option<u32>,

    /// Linear backoff step in seconds
    #[arg(long)]
    pub retry_base_delay: Option<f64>,

    /// Backoff cap in seconds
    #[arg(long)]
    pub retry_max_delay: Option<f64>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl FetchArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut FetchConfig) {
        if self.auto {
            config.instruments.clear();
        } else if let Some(instruments) = &self.instruments {
            config.instruments = instruments
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(top) = self.top {
            config.top_instruments = top;
        }
        if let Some(intervals) = &self.intervals {
            config.intervals = intervals.clone();
        }
        if let Some(hours) = self.chunk_hours {
            config.chunk_hours = hours;
        }
        if let Some(secs) = self.api_sleep_secs {
            config.api_sleep_secs = secs;
        }
        if let Some(years) = self.years_back {
            config.years_back = years;
        }
        if let Some(attempts) = self.max_retries {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = self.retry_base_delay {
            config.retry.base_delay_secs = secs;
        }
        if let Some(secs) = self.retry_max_delay {
            config.retry.max_delay_secs = secs;
        }
    }

    /// Run the fetch against the live API
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let mut config = cli.load_config()?;
        self.apply(&mut config);
        config.validate()?;

        if let Some(addr) = self.metrics_addr {
            init_metrics(addr).map_err(CliError::ConfigurationError)?;
        }

        let source = HyperliquidClient::new(&config.base_url, config.http_timeout())?;
        let mut executor = FetchExecutor::new(source, config)?;
        let summary = executor.run().await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&summary)?,
            OutputFormat::Human => print_human(&summary),
        }
        Ok(())
    }
}

fn print_json(summary: &RunSummary) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| CliError::InvalidArgument(format!("Failed to serialize summary: {e}")))?;
    println!("{json}");
    Ok(())
}

fn print_human(summary: &RunSummary) {
    println!("\nFetch completed successfully!");
    for pair in &summary.pairs {
        if pair.was_noop() {
            println!("{:<16} already current", pair.key.to_string());
        } else {
            println!(
                "{:<16} {} chunks, {} rows fetched, {} rows on disk",
                pair.key.to_string(),
                pair.chunks,
                pair.rows_fetched,
                pair.dataset_rows
            );
        }
    }
    info!(
        pairs = summary.pairs.len(),
        chunks = summary.total_chunks(),
        rows = summary.total_rows(),
        "Run summary printed"
    );
}
