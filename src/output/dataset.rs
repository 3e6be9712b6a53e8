//! Parquet dataset merge/writer
//!
//! Schema (one row per candle, sorted ascending by `t`, unique `t`):
//!
//! | column | type | meaning          |
//! |--------|------|------------------|
//! | `t`    | i64  | open time (ms)   |
//! | `T`    | i64  | close time (ms)  |
//! | `o`    | f64  | open             |
//! | `h`    | f64  | high             |
//! | `l`    | f64  | low              |
//! | `c`    | f64  | close            |
//! | `v`    | f64  | volume           |
//! | `n`    | u64  | trade count      |

use super::path::dataset_path;
use super::{OutputError, OutputResult};
use crate::{Candle, SeriesKey};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of one `merge_and_persist` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Dataset file for the series
    pub path: PathBuf,
    /// Rows on disk before the merge
    pub existing_rows: usize,
    /// Rows handed in by the caller
    pub incoming_rows: usize,
    /// Rows on disk after the merge
    pub total_rows: usize,
    /// Whether the file was rewritten
    pub written: bool,
}

impl MergeOutcome {
    /// Rows that were not already present
    pub fn added_rows(&self) -> usize {
        self.total_rows.saturating_sub(self.existing_rows)
    }
}

/// Quick facts about a stored series
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetSummary {
    /// Number of rows
    pub rows: usize,
    /// Smallest open time
    pub first_open_time: Option<i64>,
    /// Largest open time
    pub last_open_time: Option<i64>,
    /// Rows are strictly ascending by open time as stored
    pub sorted_unique: bool,
}

/// Parquet-backed candle dataset rooted at a data directory
#[derive(Debug, Clone)]
pub struct ParquetDataset {
    root: PathBuf,
}

impl ParquetDataset {
    /// Create a dataset rooted at `root`; nothing is touched on disk yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dataset file for a series
    pub fn path_for(&self, key: &SeriesKey) -> OutputResult<PathBuf> {
        dataset_path(&self.root, key)
    }

    /// Merge `new_rows` into the stored series and rewrite it atomically.
    ///
    /// Rows are keyed by open time; a row already on disk with the same open
    /// time is replaced by the incoming one. An empty `new_rows` is a no-op
    /// and does not touch the file.
    pub fn merge_and_persist(
        &self,
        key: &SeriesKey,
        new_rows: &[Candle],
    ) -> OutputResult<MergeOutcome> {
        let path = self.path_for(key)?;

        if new_rows.is_empty() {
            debug!(series = %key, "No rows to merge, skipping write");
            return Ok(MergeOutcome {
                path,
                existing_rows: 0,
                incoming_rows: 0,
                total_rows: 0,
                written: false,
            });
        }

        let existing = if path.exists() {
            read_rows(&path)?
        } else {
            Vec::new()
        };
        let existing_rows = existing.len();

        let mut merged: BTreeMap<i64, Candle> =
            existing.into_iter().map(|c| (c.open_time, c)).collect();
        for candle in new_rows {
            merged.insert(candle.open_time, *candle);
        }
        let rows: Vec<Candle> = merged.into_values().collect();

        write_rows_atomic(&path, &rows)?;

        let outcome = MergeOutcome {
            path,
            existing_rows,
            incoming_rows: new_rows.len(),
            total_rows: rows.len(),
            written: true,
        };

        info!(
            series = %key,
            path = %outcome.path.display(),
            incoming = outcome.incoming_rows,
            added = outcome.added_rows(),
            total_rows = outcome.total_rows,
            "Dataset written"
        );
        Ok(outcome)
    }

    /// Load all rows for a series, sorted by open time (empty if absent)
    pub fn load(&self, key: &SeriesKey) -> OutputResult<Vec<Candle>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rows = read_rows(&path)?;
        rows.sort_by_key(|c| c.open_time);
        Ok(rows)
    }

    /// Row count and open-time range of a stored series
    pub fn summary(&self, key: &SeriesKey) -> OutputResult<DatasetSummary> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(DatasetSummary {
                sorted_unique: true,
                ..DatasetSummary::default()
            });
        }

        let rows = read_rows(&path)?;
        Ok(DatasetSummary {
            rows: rows.len(),
            first_open_time: rows.iter().map(|c| c.open_time).min(),
            last_open_time: rows.iter().map(|c| c.open_time).max(),
            sorted_unique: rows.windows(2).all(|w| w[0].open_time < w[1].open_time),
        })
    }
}

fn parquet_err(context: &str) -> impl Fn(PolarsError) -> OutputError + '_ {
    move |e| OutputError::ParquetError(format!("{context}: {e}"))
}

fn rows_to_dataframe(rows: &[Candle]) -> OutputResult<DataFrame> {
    let open_times: Vec<i64> = rows.iter().map(|c| c.open_time).collect();
    let close_times: Vec<i64> = rows.iter().map(|c| c.close_time).collect();
    let opens: Vec<f64> = rows.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = rows.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = rows.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = rows.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = rows.iter().map(|c| c.volume).collect();
    let trades: Vec<u64> = rows.iter().map(|c| c.trades).collect();

    DataFrame::new(vec![
        Column::new("t".into(), open_times),
        Column::new("T".into(), close_times),
        Column::new("o".into(), opens),
        Column::new("h".into(), highs),
        Column::new("l".into(), lows),
        Column::new("c".into(), closes),
        Column::new("v".into(), volumes),
        Column::new("n".into(), trades),
    ])
    .map_err(parquet_err("dataframe creation"))
}

/// Write rows to a temp file next to `path`, then rename over it
fn write_rows_atomic(path: &Path, rows: &[Candle]) -> OutputResult<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create {}: {e}", parent_dir.display())))?;

    let mut df = rows_to_dataframe(rows)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;

    ParquetWriter::new(temp_file.as_file_mut())
        .finish(&mut df)
        .map_err(parquet_err("write parquet"))?;

    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;

    temp_file
        .persist(path)
        .map_err(|e| OutputError::IoError(format!("Failed to persist temp file: {e}")))?;

    if let Ok(dir) = File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Read every row of a dataset file in stored order, validating the schema
fn read_rows(path: &Path) -> OutputResult<Vec<Candle>> {
    let file = File::open(path)
        .map_err(|e| OutputError::IoError(format!("Failed to open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(parquet_err("read parquet"))?;

    let schema_err = |column: &str, e: PolarsError| {
        OutputError::SchemaError(format!("{}: column '{column}': {e}", path.display()))
    };
    let column = |name: &str| df.column(name).map_err(|e| schema_err(name, e));

    let open_times = column("t")?.i64().map_err(|e| schema_err("t", e))?;
    let close_times = column("T")?.i64().map_err(|e| schema_err("T", e))?;
    let opens = column("o")?.f64().map_err(|e| schema_err("o", e))?;
    let highs = column("h")?.f64().map_err(|e| schema_err("h", e))?;
    let lows = column("l")?.f64().map_err(|e| schema_err("l", e))?;
    let closes = column("c")?.f64().map_err(|e| schema_err("c", e))?;
    let volumes = column("v")?.f64().map_err(|e| schema_err("v", e))?;
    let trades = column("n")?.u64().map_err(|e| schema_err("n", e))?;

    let null_at = |name: &str, i: usize| {
        OutputError::SchemaError(format!("{}: null '{name}' at row {i}", path.display()))
    };

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        rows.push(Candle {
            open_time: open_times.get(i).ok_or_else(|| null_at("t", i))?,
            close_time: close_times.get(i).ok_or_else(|| null_at("T", i))?,
            open: opens.get(i).ok_or_else(|| null_at("o", i))?,
            high: highs.get(i).ok_or_else(|| null_at("h", i))?,
            low: lows.get(i).ok_or_else(|| null_at("l", i))?,
            close: closes.get(i).ok_or_else(|| null_at("c", i))?,
            volume: volumes.get(i).ok_or_else(|| null_at("v", i))?,
            trades: trades.get(i).ok_or_else(|| null_at("n", i))?,
        });
    }

    debug!(path = %path.display(), rows = rows.len(), "Dataset read");
    Ok(rows)
}
