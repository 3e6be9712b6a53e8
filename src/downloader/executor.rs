//! Chunked fetch loop
//!
//! For each (instrument, interval) pair the executor decides where to start,
//! then walks `[start, until)` in fixed-width chunks, where `until` is "now"
//! rounded down to the pair's interval so the bar still forming is never
//! stored. Every chunk is fetched,
//! merged into the dataset and only then recorded in the checkpoint store, so
//! a crash loses at most the chunk in flight and the next run fetches it
//! again. Dataset merges deduplicate by open time, which makes that refetch
//! harmless.
//!
//! A checkpoint value `X` means every closed candle with open time `< X` is
//! on disk.
//! Resuming starts at exactly `X`, the same boundary the loop itself uses
//! between consecutive chunks.

use super::client::RateLimitedClient;
use super::config::FetchConfig;
use super::job::{PairSummary, RunSummary, SyncPhase};
use super::progress::{chunks_in_range, ProgressTracker};
use super::rate_limit::RetryPolicy;
use super::DownloadError;
use crate::fetcher::retry_formatter::format_timestamp;
use crate::fetcher::CandleSource;
use crate::metrics::{self, PairMetrics};
use crate::output::ParquetDataset;
use crate::resume::{CheckpointStore, RunLock};
use crate::selector::select_instruments;
use crate::{Interval, SeriesKey};
use chrono::Utc;
use tracing::{debug, info, info_span, Instrument};

/// Drives the fetch loop for every configured pair
pub struct FetchExecutor<S> {
    client: RateLimitedClient<S>,
    config: FetchConfig,
    checkpoints: CheckpointStore,
    dataset: ParquetDataset,
    progress_tracker: ProgressTracker,
}

impl<S: CandleSource> FetchExecutor<S> {
    /// Validate `config` and load the checkpoint store.
    ///
    /// # Errors
    /// A config that fails validation, or a checkpoint file that exists but
    /// cannot be parsed.
    pub fn new(source: S, config: FetchConfig) -> Result<Self, DownloadError> {
        config.validate()?;

        let checkpoints = CheckpointStore::load(&config.checkpoint_file)?;
        let dataset = ParquetDataset::new(&config.data_dir);
        let client = RateLimitedClient::new(source, RetryPolicy::from_config(&config.retry));

        Ok(Self {
            client,
            config,
            checkpoints,
            dataset,
            progress_tracker: ProgressTracker::default(),
        })
    }

    /// Override progress reporting cadence.
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Checkpoint store
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Dataset writer
    pub fn dataset(&self) -> &ParquetDataset {
        &self.dataset
    }

    /// Rate-limited client
    pub fn client(&self) -> &RateLimitedClient<S> {
        &self.client
    }

    /// Sync every configured pair, each up to the wall clock at its start.
    pub async fn run(&mut self) -> Result<RunSummary, DownloadError> {
        self.run_inner(None).await
    }

    /// Sync every configured pair up to a fixed `now_ms`.
    pub async fn run_at(&mut self, now_ms: i64) -> Result<RunSummary, DownloadError> {
        self.run_inner(Some(now_ms)).await
    }

    async fn run_inner(&mut self, now_ms: Option<i64>) -> Result<RunSummary, DownloadError> {
        let mut lock = RunLock::open(&self.config.checkpoint_file)?;
        let lock_path = lock.path().to_path_buf();
        let _guard = lock.try_exclusive()?;
        debug!(lock = %lock_path.display(), "Run lock acquired");

        // Another run may have finished between construction and locking.
        self.checkpoints = CheckpointStore::load(&self.config.checkpoint_file)?;

        let instruments = self.resolve_instruments().await?;
        let keys = series_keys(&instruments, &self.config.intervals);

        info!(
            instruments = instruments.len(),
            intervals = self.config.intervals.len(),
            pairs = keys.len(),
            endpoint = self.client.source().endpoint(),
            "Starting fetch run"
        );

        let mut summary = RunSummary {
            instruments,
            pairs: Vec::with_capacity(keys.len()),
        };

        for key in &keys {
            let pair_metrics = PairMetrics::start(key.to_string());
            let pair_now = now_ms.unwrap_or_else(|| Utc::now().timestamp_millis());

            match self.sync_pair_at(key, pair_now).await {
                Ok(pair) => {
                    pair_metrics.record_success(pair.rows_fetched);
                    summary.pairs.push(pair);
                }
                Err(e) => {
                    pair_metrics.record_failure(&e.to_string());
                    return Err(e);
                }
            }
        }

        info!(
            pairs = summary.pairs.len(),
            chunks = summary.total_chunks(),
            rows = summary.total_rows(),
            "Fetch run complete"
        );
        Ok(summary)
    }

    /// Configured instruments, or the top instruments by volume when the
    /// configured list is empty.
    pub async fn resolve_instruments(&self) -> Result<Vec<String>, DownloadError> {
        if !self.config.automatic_instruments() {
            return Ok(self.config.instruments.clone());
        }

        let selected = select_instruments(&self.client, self.config.top_instruments).await?;
        if selected.is_empty() {
            return Err(DownloadError::ConfigError(
                "automatic instrument selection returned no instruments".to_string(),
            ));
        }
        Ok(selected)
    }

    /// Sync one pair up to the wall clock.
    pub async fn sync_pair(&mut self, key: &SeriesKey) -> Result<PairSummary, DownloadError> {
        self.sync_pair_at(key, Utc::now().timestamp_millis()).await
    }

    /// Sync one pair up to the last interval boundary at or before `now_ms`.
    ///
    /// The bar open at `now_ms` is still forming and is left for a later run.
    /// Does not take the run lock; [`run`](Self::run) does.
    pub async fn sync_pair_at(
        &mut self,
        key: &SeriesKey,
        now_ms: i64,
    ) -> Result<PairSummary, DownloadError> {
        let span = info_span!("sync_pair", series = %key);
        self.sync_pair_inner(key, now_ms).instrument(span).await
    }

    async fn sync_pair_inner(
        &mut self,
        key: &SeriesKey,
        now_ms: i64,
    ) -> Result<PairSummary, DownloadError> {
        // Fail on an unusable instrument name before any request goes out.
        self.dataset.path_for(key)?;

        let until_ms = last_closed_boundary(now_ms, key.interval);
        let mut pair = PairSummary::new(key.clone(), until_ms);

        let start_ms = match self.checkpoints.get(key) {
            Some(checkpoint) => {
                pair.phase = SyncPhase::Resuming;
                info!(
                    checkpoint,
                    from = %format_timestamp(checkpoint),
                    "Resuming from checkpoint"
                );
                checkpoint
            }
            None => {
                pair.phase = SyncPhase::Bootstrapping;
                let start = now_ms.saturating_sub(self.config.horizon_ms());
                info!(
                    years_back = self.config.years_back,
                    from = %format_timestamp(start),
                    "No checkpoint, bootstrapping history"
                );
                start
            }
        };

        if start_ms >= until_ms {
            info!("Already current, nothing to fetch");
            pair.phase = SyncPhase::Current;
            pair.final_checkpoint = self.checkpoints.get(key);
            pair.dataset_rows = self.dataset.summary(key)?.rows;
            return Ok(pair);
        }

        let chunk_ms = self.config.chunk_width_ms();
        let api_sleep = self.config.api_sleep();
        let mut progress = self
            .progress_tracker
            .create_state(chunks_in_range(start_ms, until_ms, chunk_ms), (start_ms, until_ms));

        pair.start_ms = Some(start_ms);
        pair.phase = SyncPhase::FetchingChunk;

        let mut cursor = start_ms;
        while cursor < until_ms {
            let end_ms = cursor.saturating_add(chunk_ms).min(until_ms);

            let rows = self.client.fetch_candles(key, cursor, end_ms).await?;
            debug!(
                from = %format_timestamp(cursor),
                to = %format_timestamp(end_ms),
                rows = rows.len(),
                "Chunk fetched"
            );

            let merged = self.dataset.merge_and_persist(key, &rows)?;
            if merged.written {
                pair.dataset_rows = merged.total_rows;
            }

            // Only after the rows are durable.
            let checkpoint = self.checkpoints.advance(key, end_ms)?;
            pair.final_checkpoint = Some(checkpoint);
            pair.chunks += 1;
            pair.rows_fetched += rows.len() as u64;
            metrics::record_chunk(key.interval.as_str(), rows.len());

            progress.record_chunk(rows.len() as u64, end_ms);
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }

            if !api_sleep.is_zero() {
                tokio::time::sleep(api_sleep).await;
            }
            cursor = end_ms;
        }

        if pair.dataset_rows == 0 {
            pair.dataset_rows = self.dataset.summary(key)?.rows;
        }
        pair.phase = SyncPhase::Current;

        info!(
            chunks = pair.chunks,
            rows = pair.rows_fetched,
            dataset_rows = pair.dataset_rows,
            checkpoint = %format_timestamp(until_ms),
            "Pair is current"
        );
        Ok(pair)
    }
}

/// Open time of the bar in progress at `now_ms`, which is also the end of
/// the last closed bar
pub fn last_closed_boundary(now_ms: i64, interval: Interval) -> i64 {
    now_ms - now_ms.rem_euclid(interval.to_milliseconds())
}

/// Every (instrument, interval) combination, instrument-major
pub fn series_keys(instruments: &[String], intervals: &[Interval]) -> Vec<SeriesKey> {
    instruments
        .iter()
        .flat_map(|instrument| {
            intervals
                .iter()
                .map(move |interval| SeriesKey::new(instrument.clone(), *interval))
        })
        .collect()
}
