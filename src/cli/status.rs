//! `status` command: checkpoint and dataset state per pair

use crate::downloader::executor::series_keys;
use crate::downloader::FetchConfig;
use crate::fetcher::retry_formatter::format_timestamp;
use crate::output::ParquetDataset;
use crate::resume::CheckpointStore;
use crate::SeriesKey;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::str::FromStr;

use super::{Cli, CliError, OutputFormat};

/// Show the stored state of every pair
#[derive(Args, Debug, Default)]
pub struct StatusCommand {
    /// Also list pairs that only appear in the checkpoint file
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

/// State of one pair on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairStatus {
    /// Checkpoint key (e.g. "BTC_1m")
    pub series: String,
    /// Checkpoint value in ms
    pub checkpoint: Option<i64>,
    /// Rows in the dataset file
    pub rows: usize,
    /// Smallest open time
    pub first_open_time: Option<i64>,
    /// Largest open time
    pub last_open_time: Option<i64>,
    /// Rows strictly ascending by open time with no duplicates
    pub sorted_unique: bool,
}

/// Gather the status of the configured pairs (plus every checkpointed pair
/// when `include_checkpointed` is set, or when the config selects
/// instruments automatically).
pub fn collect_status(
    config: &FetchConfig,
    include_checkpointed: bool,
) -> Result<Vec<PairStatus>, CliError> {
    let store = CheckpointStore::load(&config.checkpoint_file)?;
    let dataset = ParquetDataset::new(&config.data_dir);

    let mut keys: BTreeSet<SeriesKey> = series_keys(&config.instruments, &config.intervals)
        .into_iter()
        .collect();
    if include_checkpointed || config.automatic_instruments() {
        keys.extend(
            store
                .entries()
                .keys()
                .filter_map(|k| SeriesKey::from_str(k).ok()),
        );
    }

    keys.into_iter()
        .map(|key| -> Result<PairStatus, CliError> {
            let summary = dataset.summary(&key)?;
            Ok(PairStatus {
                series: key.to_string(),
                checkpoint: store.get(&key),
                rows: summary.rows,
                first_open_time: summary.first_open_time,
                last_open_time: summary.last_open_time,
                sorted_unique: summary.sorted_unique,
            })
        })
        .collect()
}

impl StatusCommand {
    /// Print the status table
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let statuses = collect_status(&config, self.all)?;

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&statuses).map_err(|e| {
                    CliError::InvalidArgument(format!("Failed to serialize status: {e}"))
                })?;
                println!("{json}");
            }
            OutputFormat::Human => {
                if statuses.is_empty() {
                    println!("No pairs configured or checkpointed");
                }
                for status in &statuses {
                    println!("{}", format_status_line(status));
                }
            }
        }
        Ok(())
    }
}

fn format_status_line(status: &PairStatus) -> String {
    let checkpoint = status
        .checkpoint
        .map(format_timestamp)
        .unwrap_or_else(|| "never".to_string());
    let range = match (status.first_open_time, status.last_open_time) {
        (Some(first), Some(last)) => {
            format!("{} .. {}", format_timestamp(first), format_timestamp(last))
        }
        _ => "-".to_string(),
    };
    let order = if status.sorted_unique { "ok" } else { "UNSORTED" };

    format!(
        "{:<16} checkpoint={checkpoint:<16} rows={:<9} range={range} order={order}",
        status.series, status.rows
    )
}
