//! Observability metrics for the candle backfill
//!
//! Counters and histograms for remote requests, 429 responses, retry backoff,
//! fetched chunks, merged rows and per-pair outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every call is a no-op
//! - A Prometheus scrape endpoint is installed only when an address is configured

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Initialize the metrics system with a Prometheus exporter
///
/// Must be called from within a Tokio runtime. Idempotent: a second call is
/// a no-op.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "127.0.0.1:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    let mut initialized = METRICS_INITIALIZED
        .lock()
        .map_err(|_| "metrics flag poisoned".to_string())?;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of requests made to the info endpoint"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of rate-limit retries"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "chunks_fetched_total",
        Unit::Count,
        "Total number of chunks fetched and committed"
    );
    describe_counter!(
        "rows_merged_total",
        Unit::Count,
        "Total number of candle rows handed to the dataset writer"
    );
    describe_counter!(
        "pairs_completed_total",
        Unit::Count,
        "Total number of (instrument, interval) pairs brought current"
    );
    describe_counter!(
        "pairs_failed_total",
        Unit::Count,
        "Total number of pairs that aborted with an error"
    );

    *initialized = true;
    info!(addr = %addr, "Metrics system initialized");
    Ok(())
}

/// Check whether the Prometheus exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED
        .lock()
        .map(|flag| *flag)
        .unwrap_or(false)
}

/// Timing and outcome of one remote request
pub struct HttpRequestMetrics {
    request_type: &'static str,
    start_time: Instant,
}

impl HttpRequestMetrics {
    /// Start timing a request of the given type (e.g. "candleSnapshot")
    pub fn start(request_type: &'static str) -> Self {
        Self {
            request_type,
            start_time: Instant::now(),
        }
    }

    /// Record a response with an HTTP status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "request_type" => self.request_type,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "request_type" => self.request_type,
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!("http_429_errors_total", "request_type" => self.request_type).increment(1);
            warn!(
                request_type = self.request_type,
                duration_ms = duration.as_millis() as u64,
                "Rate limit response (429)"
            );
        }
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "request_type" => self.request_type,
            "status" => "network_error",
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "request_type" => self.request_type,
        )
        .record(duration.as_secs_f64());
    }
}

/// Record one rate-limit backoff
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record a committed chunk and the rows it carried
pub fn record_chunk(interval: &str, rows: usize) {
    counter!("chunks_fetched_total", "interval" => interval.to_string()).increment(1);
    counter!("rows_merged_total", "interval" => interval.to_string()).increment(rows as u64);
}

/// Per-pair outcome tracking
pub struct PairMetrics {
    series: String,
    start_time: Instant,
}

impl PairMetrics {
    /// Start tracking a pair
    pub fn start(series: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            start_time: Instant::now(),
        }
    }

    /// Record that the pair reached the current phase
    pub fn record_success(&self, rows: u64) {
        counter!("pairs_completed_total").increment(1);
        info!(
            series = %self.series,
            rows,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Pair synced"
        );
    }

    /// Record that the pair aborted
    pub fn record_failure(&self, error: &str) {
        counter!("pairs_failed_total").increment(1);
        error!(
            series = %self.series,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Pair failed"
        );
    }
}
