//! Per-pair sync state and run summaries

use crate::SeriesKey;
use serde::{Deserialize, Serialize};

/// Where a pair is in its sync for the current run
///
/// `Unstarted → Resuming | Bootstrapping → FetchingChunk → Current`.
/// A fatal error leaves the pair in the phase it failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncPhase {
    /// Nothing decided yet
    #[default]
    Unstarted,
    /// Checkpoint found, continuing from it
    Resuming,
    /// No checkpoint, starting at the history horizon
    Bootstrapping,
    /// Walking chunks towards "now"
    FetchingChunk,
    /// Caught up to "now" for this run
    Current,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Unstarted => "unstarted",
            SyncPhase::Resuming => "resuming",
            SyncPhase::Bootstrapping => "bootstrapping",
            SyncPhase::FetchingChunk => "fetching",
            SyncPhase::Current => "current",
        };
        f.write_str(name)
    }
}

/// Outcome of syncing one (instrument, interval) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSummary {
    /// Series that was synced
    pub key: SeriesKey,
    /// Phase reached
    pub phase: SyncPhase,
    /// First requested millisecond, if anything was requested
    pub start_ms: Option<i64>,
    /// Upper bound the pair was synced towards
    pub now_ms: i64,
    /// Chunks requested and committed
    pub chunks: u64,
    /// Rows returned by the remote across all chunks
    pub rows_fetched: u64,
    /// Checkpoint after the sync
    pub final_checkpoint: Option<i64>,
    /// Rows in the dataset file after the sync
    pub dataset_rows: usize,
}

impl PairSummary {
    /// Fresh summary for a pair that has not started
    pub fn new(key: SeriesKey, now_ms: i64) -> Self {
        Self {
            key,
            phase: SyncPhase::Unstarted,
            start_ms: None,
            now_ms,
            chunks: 0,
            rows_fetched: 0,
            final_checkpoint: None,
            dataset_rows: 0,
        }
    }

    /// Whether the pair was already current and nothing was requested
    pub fn was_noop(&self) -> bool {
        self.phase == SyncPhase::Current && self.chunks == 0
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Instruments the run covered, in processing order
    pub instruments: Vec<String>,
    /// One entry per pair, in processing order
    pub pairs: Vec<PairSummary>,
}

impl RunSummary {
    /// Chunks requested across all pairs
    pub fn total_chunks(&self) -> u64 {
        self.pairs.iter().map(|p| p.chunks).sum()
    }

    /// Rows fetched across all pairs
    pub fn total_rows(&self) -> u64 {
        self.pairs.iter().map(|p| p.rows_fetched).sum()
    }
}
