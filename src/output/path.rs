//! Dataset path layout
//!
//! One Parquet file per series: `{root}/{instrument}/{interval}.parquet`.
//!
//! ```rust
//! use candle_backfill::output::path::dataset_path;
//! use candle_backfill::{Interval, SeriesKey};
//! use std::path::Path;
//!
//! let key = SeriesKey::new("BTC", Interval::OneMinute);
//! let path = dataset_path(Path::new("data"), &key).unwrap();
//! assert_eq!(path, Path::new("data").join("BTC").join("1m.parquet"));
//! ```

use super::{OutputError, OutputResult};
use crate::SeriesKey;
use std::path::{Path, PathBuf};

/// File extension of dataset files
pub const DATASET_EXTENSION: &str = "parquet";

/// Path of the dataset file for a series
///
/// # Errors
/// [`OutputError::InvalidPath`] when the instrument cannot be turned into a
/// safe directory name.
pub fn dataset_path(root: &Path, key: &SeriesKey) -> OutputResult<PathBuf> {
    let dir = sanitize_instrument(&key.instrument)?;
    Ok(root
        .join(dir)
        .join(format!("{}.{DATASET_EXTENSION}", key.interval.as_str())))
}

/// Encode an instrument name as a single path segment
///
/// Directory separators, drive markers and the escape character itself are
/// percent-encoded (`/` as `%2F`, `\` as `%5C`, `:` as `%3A`, `%` as `%25`),
/// so distinct names always land in distinct directories. Case is preserved.
/// Names that are empty, `.`, `..` or padded with whitespace are rejected
/// instead of being rewritten.
pub fn sanitize_instrument(name: &str) -> OutputResult<String> {
    if name.is_empty() || name == "." || name == ".." || name.trim() != name {
        return Err(OutputError::InvalidPath(format!(
            "instrument '{name}' does not map to a usable directory name"
        )));
    }

    let mut encoded = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            ':' => encoded.push_str("%3A"),
            other => encoded.push(other),
        }
    }
    Ok(encoded)
}
