//! Dataset storage
//!
//! One Parquet file per (instrument, interval), always rewritten whole and
//! renamed into place so readers never see a partial file.

pub mod dataset;
pub mod path;

pub use dataset::{DatasetSummary, MergeOutcome, ParquetDataset};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Parquet encode/decode error
    #[error("parquet error: {0}")]
    ParquetError(String),

    /// Existing file does not have the expected columns, types or values
    #[error("schema error: {0}")]
    SchemaError(String),

    /// Series cannot be mapped to a safe file path
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
