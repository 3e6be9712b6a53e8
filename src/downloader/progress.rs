//! Progress reporting for long pair syncs.
//!
//! A bootstrap of three years of one-minute candles is over a thousand
//! chunks, so the executor emits a progress line every 10 percentage points,
//! or every 60 seconds once the sync has run for 30 seconds.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_SYNC_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] for a pair expected to need `total_chunks`.
    pub fn create_state(&self, total_chunks: u64, range: (i64, i64)) -> ProgressState {
        let mut state = ProgressState::new(total_chunks, range);
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, DEFAULT_PERCENTAGE_STEP)
    }
}

/// Progress of one pair sync.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Chunks committed so far.
    pub chunks_done: u64,
    /// Chunks needed to reach the end of the range.
    pub total_chunks: u64,
    /// Rows fetched so far.
    pub rows_fetched: u64,
    /// Range being synced (start, end) in millis.
    pub range: (i64, i64),
    /// End of the last committed chunk.
    pub last_position: Option<i64>,
    start_time: Instant,
    last_update: Instant,
    update_interval: Duration,
    last_reported_percentage: f64,
    min_percentage_step: f64,
}

impl ProgressState {
    /// Create a state with default cadence.
    pub fn new(total_chunks: u64, range: (i64, i64)) -> Self {
        let now = Instant::now();
        Self {
            chunks_done: 0,
            total_chunks,
            rows_fetched: 0,
            range,
            last_position: None,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Record one committed chunk.
    pub fn record_chunk(&mut self, rows: u64, chunk_end: i64) {
        self.chunks_done = self.chunks_done.saturating_add(1);
        self.rows_fetched = self.rows_fetched.saturating_add(rows);
        self.last_position = Some(chunk_end);
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        (self.chunks_done as f64 / self.total_chunks as f64 * 100.0).min(100.0)
    }

    /// Chunks per second since the sync started.
    pub fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.chunks_done as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Whether a progress line is due.
    pub fn should_emit_update(&self) -> bool {
        if self.chunks_done == 0 || self.chunks_done >= self.total_chunks {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_SYNC_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress line.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Estimated time to finish at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.total_chunks.saturating_sub(self.chunks_done);
        if rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }

    /// Human-readable progress line.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![
            format!(
                "[PROGRESS] {}/{} chunks",
                self.chunks_done, self.total_chunks
            ),
            format!("- {:.1}% complete", self.percentage()),
            format!("({} rows)", self.rows_fetched),
        ];

        let rate = self.rate();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} chunks/sec"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Number of chunks of width `chunk_ms` needed to cover `[start, end)`
pub fn chunks_in_range(start: i64, end: i64, chunk_ms: i64) -> u64 {
    if end <= start || chunk_ms <= 0 {
        return 0;
    }
    ((end - start) as u64).div_ceil(chunk_ms as u64)
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
