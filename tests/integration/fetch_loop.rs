//! End-to-end fetch loop against a scripted source

use crate::support::{test_config, Fallback, ScriptedSource, DAY_MS, NOW_MS};
use candle_backfill::downloader::{DownloadError, FetchExecutor, SyncPhase};
use candle_backfill::fetcher::FetcherError;
use candle_backfill::resume::{CheckpointStore, ResumeError, RunLock};
use candle_backfill::{Interval, SeriesKey};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const HOUR_MS: i64 = 3_600_000;

fn seed_checkpoint(path: &Path, entries: &[(&str, i64)]) {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    std::fs::write(path, serde_json::to_string_pretty(&map).unwrap()).unwrap();
}

fn stored_checkpoint(path: &Path, key: &SeriesKey) -> Option<i64> {
    CheckpointStore::load(path).unwrap().get(key)
}

#[tokio::test(start_paused = true)]
async fn test_fresh_run_backfills_three_years_of_daily_rows() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneDay]);
    let checkpoint_file = config.checkpoint_file.clone();
    let key = SeriesKey::new("BTC", Interval::OneDay);

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let summary = executor.run_at(NOW_MS).await.unwrap();

    let start = NOW_MS - 3 * 365 * DAY_MS;
    let pair = &summary.pairs[0];
    assert_eq!(pair.phase, SyncPhase::Current);
    assert_eq!(pair.start_ms, Some(start));
    assert_eq!(pair.chunks, 1095);
    assert_eq!(pair.rows_fetched, 1095);
    assert_eq!(pair.final_checkpoint, Some(NOW_MS));
    assert_eq!(pair.dataset_rows, 1095);

    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));

    let stored = executor.dataset().summary(&key).unwrap();
    assert_eq!(stored.rows, 1095);
    assert!(stored.sorted_unique);
    assert_eq!(stored.first_open_time, Some(start));
    assert_eq!(stored.last_open_time, Some(NOW_MS - DAY_MS));

    // Chunks tile the range with no gaps or overlaps
    let requests = executor.client().source().requests();
    assert_eq!(requests.len(), 1095);
    assert_eq!(requests[0].start_ms, start);
    for pair in requests.windows(2) {
        assert_eq!(pair[0].end_ms, pair[1].start_ms);
        assert_eq!(pair[0].end_ms - pair[0].start_ms, DAY_MS);
    }
    assert_eq!(requests.last().unwrap().end_ms, NOW_MS);
}

#[tokio::test(start_paused = true)]
async fn test_resumed_run_matches_uninterrupted_run() {
    let key = SeriesKey::new("BTC", Interval::OneHour);
    let origin = NOW_MS - 30 * DAY_MS;

    // Uninterrupted reference
    let reference_dir = TempDir::new().unwrap();
    let config = test_config(reference_dir.path(), &["BTC"], &[Interval::OneHour]);
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", origin)]);
    let mut reference = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    reference.run_at(NOW_MS).await.unwrap();
    let expected = reference.dataset().load(&key).unwrap();
    assert_eq!(expected.len(), 30 * 24);

    // Same series, stopped part way by an exhausted chunk
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    config.retry.max_attempts = 2;
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", origin)]);
    let checkpoint_file = config.checkpoint_file.clone();

    let failing = ScriptedSource::new(Fallback::RateLimited).succeeding_first(5);
    let mut executor = FetchExecutor::new(failing, config.clone()).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();
    assert!(matches!(err, DownloadError::RateLimitExhausted { .. }));

    let stopped_at = stored_checkpoint(&checkpoint_file, &key).unwrap();
    assert_eq!(stopped_at, origin + 5 * DAY_MS);

    let mut resumed = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    resumed.run_at(NOW_MS).await.unwrap();

    let requests = resumed.client().source().requests();
    assert_eq!(requests[0].start_ms, stopped_at);
    assert!(requests.iter().all(|r| r.end_ms > stopped_at));

    assert_eq!(resumed.dataset().load(&key).unwrap(), expected);
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));
}

#[tokio::test(start_paused = true)]
async fn test_resume_boundary_not_aligned_to_chunks() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["ETH"], &[Interval::OneHour]);
    let checkpoint = NOW_MS - 2 * DAY_MS - 5 * HOUR_MS;
    seed_checkpoint(&config.checkpoint_file, &[("ETH_1h", checkpoint)]);

    let key = SeriesKey::new("ETH", Interval::OneHour);
    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let summary = executor.run_at(NOW_MS).await.unwrap();

    assert_eq!(summary.pairs[0].phase, SyncPhase::Current);
    assert_eq!(summary.pairs[0].chunks, 3);

    let rows = executor.dataset().load(&key).unwrap();
    assert_eq!(rows.len(), 2 * 24 + 5);
    assert_eq!(rows[0].open_time, checkpoint);
    assert_eq!(rows.last().unwrap().open_time, NOW_MS - HOUR_MS);
}

#[tokio::test(start_paused = true)]
async fn test_forming_bar_is_left_for_next_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", NOW_MS - DAY_MS)]);
    let checkpoint_file = config.checkpoint_file.clone();
    let key = SeriesKey::new("BTC", Interval::OneHour);

    // Half way through the bar that opened at NOW_MS
    let first_now = NOW_MS + 30 * 60_000;
    let mut first =
        FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config.clone()).unwrap();
    let summary = first.run_at(first_now).await.unwrap();

    assert_eq!(summary.pairs[0].now_ms, NOW_MS);
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));
    let rows = first.dataset().load(&key).unwrap();
    assert_eq!(rows.len(), 24);
    assert!(rows.iter().all(|c| c.close_time < first_now));
    assert_eq!(first.client().source().requests().last().unwrap().end_ms, NOW_MS);

    // Still inside the same bar: nothing to do
    let mut again =
        FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config.clone()).unwrap();
    assert!(again.run_at(first_now + 60_000).await.unwrap().pairs[0].was_noop());
    assert_eq!(again.client().source().calls(), 0);

    // Three hours later the skipped bar is fetched in full
    let mut second = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    second.run_at(NOW_MS + 3 * HOUR_MS + 5_000).await.unwrap();

    let requests = second.client().source().requests();
    assert_eq!(requests[0].start_ms, NOW_MS);
    assert_eq!(requests.last().unwrap().end_ms, NOW_MS + 3 * HOUR_MS);

    let rows = second.dataset().load(&key).unwrap();
    assert_eq!(rows.len(), 27);
    assert!(rows.iter().any(|c| c.open_time == NOW_MS));
    assert_eq!(rows.last().unwrap().open_time, NOW_MS + 2 * HOUR_MS);
    assert_eq!(
        stored_checkpoint(&checkpoint_file, &key),
        Some(NOW_MS + 3 * HOUR_MS)
    );
}

#[tokio::test(start_paused = true)]
async fn test_chunk_wider_than_one_response_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["BTC"], &[Interval::OneMinute]);
    config.chunk_hours = 168;

    let source = ScriptedSource::new(Fallback::Candles).with_row_cap(5_000);
    let result = FetchExecutor::new(source, config);
    assert!(matches!(result, Err(DownloadError::ConfigError(_))));
}

#[tokio::test(start_paused = true)]
async fn test_chunks_within_response_cap_store_every_row() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["BTC"], &[Interval::OneMinute]);
    config.chunk_hours = 72;
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1m", NOW_MS - 6 * DAY_MS)]);
    let checkpoint_file = config.checkpoint_file.clone();
    let key = SeriesKey::new("BTC", Interval::OneMinute);

    let source = ScriptedSource::new(Fallback::Candles).with_row_cap(5_000);
    let mut executor = FetchExecutor::new(source, config).unwrap();
    executor.run_at(NOW_MS).await.unwrap();

    assert_eq!(executor.client().source().calls(), 2);
    let stored = executor.dataset().summary(&key).unwrap();
    assert_eq!(stored.rows, 6 * 1_440);
    assert!(stored.sorted_unique);
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", NOW_MS - DAY_MS)]);
    let checkpoint_file = config.checkpoint_file.clone();

    let source = ScriptedSource::new(Fallback::Candles).failing_first(vec![
        FetcherError::RateLimited { status: 429 },
        FetcherError::RateLimited { status: 429 },
    ]);
    let mut executor = FetchExecutor::new(source, config).unwrap();

    let started = tokio::time::Instant::now();
    executor.run_at(NOW_MS).await.unwrap();

    let key = SeriesKey::new("BTC", Interval::OneHour);
    assert_eq!(executor.client().source().calls(), 3);
    // Two backoff sleeps: 5s then 10s, no jitter, no inter-request pause
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));
    assert_eq!(executor.dataset().summary(&key).unwrap().rows, 24);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_leave_checkpoint_untouched() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    config.retry.max_attempts = 3;
    let seeded = NOW_MS - 3 * DAY_MS;
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", seeded)]);
    let checkpoint_file = config.checkpoint_file.clone();

    let mut executor =
        FetchExecutor::new(ScriptedSource::new(Fallback::RateLimited), config).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();

    match err {
        DownloadError::RateLimitExhausted { key, attempts } => {
            assert_eq!(key, "BTC_1h");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let key = SeriesKey::new("BTC", Interval::OneHour);
    assert_eq!(executor.client().source().calls(), 3);
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(seeded));
    assert!(!executor.dataset().path_for(&key).unwrap().exists());
}

#[tokio::test(start_paused = true)]
async fn test_rerun_when_current_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", NOW_MS - DAY_MS)]);
    let checkpoint_file = config.checkpoint_file.clone();
    let key = SeriesKey::new("BTC", Interval::OneHour);

    let mut first = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config.clone()).unwrap();
    first.run_at(NOW_MS).await.unwrap();
    let dataset_path = first.dataset().path_for(&key).unwrap();

    let dataset_bytes = std::fs::read(&dataset_path).unwrap();
    let dataset_mtime = std::fs::metadata(&dataset_path).unwrap().modified().unwrap();
    let checkpoint_bytes = std::fs::read(&checkpoint_file).unwrap();
    let checkpoint_mtime = std::fs::metadata(&checkpoint_file).unwrap().modified().unwrap();

    let mut second = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let summary = second.run_at(NOW_MS).await.unwrap();

    let pair = &summary.pairs[0];
    assert!(pair.was_noop());
    assert_eq!(pair.phase, SyncPhase::Current);
    assert_eq!(pair.final_checkpoint, Some(NOW_MS));
    assert_eq!(pair.dataset_rows, 24);
    assert_eq!(second.client().source().calls(), 0);

    assert_eq!(std::fs::read(&dataset_path).unwrap(), dataset_bytes);
    assert_eq!(
        std::fs::metadata(&dataset_path).unwrap().modified().unwrap(),
        dataset_mtime
    );
    assert_eq!(std::fs::read(&checkpoint_file).unwrap(), checkpoint_bytes);
    assert_eq!(
        std::fs::metadata(&checkpoint_file).unwrap().modified().unwrap(),
        checkpoint_mtime
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_chunks_still_advance_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["SOL"], &[Interval::OneMinute]);
    seed_checkpoint(&config.checkpoint_file, &[("SOL_1m", NOW_MS - 2 * DAY_MS)]);
    let checkpoint_file = config.checkpoint_file.clone();
    let key = SeriesKey::new("SOL", Interval::OneMinute);

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Empty), config).unwrap();
    let summary = executor.run_at(NOW_MS).await.unwrap();

    assert_eq!(summary.pairs[0].chunks, 2);
    assert_eq!(summary.pairs[0].rows_fetched, 0);
    assert_eq!(summary.pairs[0].dataset_rows, 0);
    assert_eq!(stored_checkpoint(&checkpoint_file, &key), Some(NOW_MS));
    assert!(!executor.dataset().path_for(&key).unwrap().exists());
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_every_chunk() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["BTC"], &[Interval::OneDay]);
    config.api_sleep_secs = 0.25;
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1d", NOW_MS - 4 * DAY_MS)]);

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let started = tokio::time::Instant::now();
    executor.run_at(NOW_MS).await.unwrap();

    assert_eq!(executor.client().source().calls(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_pairs_run_in_instrument_major_order() {
    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        &["BTC", "ETH"],
        &[Interval::OneHour, Interval::FourHours],
    );
    let since = NOW_MS - DAY_MS;
    seed_checkpoint(
        &config.checkpoint_file,
        &[("BTC_1h", since), ("BTC_4h", since), ("ETH_1h", since), ("ETH_4h", since)],
    );

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let summary = executor.run_at(NOW_MS).await.unwrap();

    let order: Vec<String> = summary.pairs.iter().map(|p| p.key.to_string()).collect();
    assert_eq!(order, vec!["BTC_1h", "BTC_4h", "ETH_1h", "ETH_4h"]);
    assert_eq!(summary.total_rows(), 24 + 6 + 24 + 6);
    assert_eq!(summary.total_chunks(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_automatic_selection_picks_top_volume() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[], &[Interval::OneDay]);
    config.top_instruments = 2;
    let since = NOW_MS - 2 * DAY_MS;
    seed_checkpoint(&config.checkpoint_file, &[("ETH_1d", since), ("BTC_1d", since)]);

    let source = ScriptedSource::new(Fallback::Candles).with_instruments(&[
        ("BTC", 5_000.0),
        ("ETH", 9_000.0),
        ("DOGE", 10.0),
    ]);
    let mut executor = FetchExecutor::new(source, config).unwrap();
    let summary = executor.run_at(NOW_MS).await.unwrap();

    assert_eq!(summary.instruments, vec!["ETH", "BTC"]);
    assert_eq!(executor.client().source().listings(), 1);

    let requested: Vec<String> = executor
        .client()
        .source()
        .requests()
        .into_iter()
        .map(|r| r.instrument)
        .collect();
    assert_eq!(requested, vec!["ETH", "ETH", "BTC", "BTC"]);
}

#[tokio::test(start_paused = true)]
async fn test_automatic_selection_with_empty_listing_fails() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[], &[Interval::OneDay]);

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();

    assert!(matches!(err, DownloadError::ConfigError(_)));
    assert_eq!(executor.client().source().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_rate_limit_error_aborts_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC", "ETH"], &[Interval::OneHour]);
    let since = NOW_MS - DAY_MS;
    seed_checkpoint(&config.checkpoint_file, &[("BTC_1h", since), ("ETH_1h", since)]);
    let checkpoint_file = config.checkpoint_file.clone();

    let source = ScriptedSource::new(Fallback::Candles).failing_first(vec![FetcherError::ApiError {
        status: 400,
        body: "unknown coin".to_string(),
    }]);
    let mut executor = FetchExecutor::new(source, config).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Fetcher(FetcherError::ApiError { status: 400, .. })
    ));
    // ETH is never reached
    assert_eq!(executor.client().source().calls(), 1);
    let eth = SeriesKey::new("ETH", Interval::OneHour);
    assert_eq!(stored_checkpoint(&checkpoint_file, &eth), Some(since));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_instrument_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[".."], &[Interval::OneHour]);

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();

    assert!(matches!(err, DownloadError::Output(_)));
    assert_eq!(executor.client().source().calls(), 0);
}

#[test]
fn test_corrupt_checkpoint_refuses_to_start() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);
    std::fs::write(&config.checkpoint_file, "{not json").unwrap();

    let result = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config);
    assert!(matches!(
        result,
        Err(DownloadError::Resume(ResumeError::CorruptCheckpoint { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_second_run_on_same_checkpoint_fails_fast() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["BTC"], &[Interval::OneHour]);

    let mut held = RunLock::open(&config.checkpoint_file).unwrap();
    let _guard = held.try_exclusive().unwrap();

    let mut executor = FetchExecutor::new(ScriptedSource::new(Fallback::Candles), config).unwrap();
    let err = executor.run_at(NOW_MS).await.unwrap_err();

    assert!(matches!(err, DownloadError::Resume(ResumeError::LockError(_))));
    assert_eq!(executor.client().source().calls(), 0);
}
