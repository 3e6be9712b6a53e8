//! Rate-limited wrapper around a [`CandleSource`]
//!
//! Retries a request only when the remote answers with its rate-limit signal,
//! sleeping per [`RetryPolicy`] between attempts. Every other error is
//! returned on the first occurrence.

use super::rate_limit::RetryPolicy;
use super::DownloadError;
use crate::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use crate::fetcher::{CandleSource, FetcherResult};
use crate::metrics;
use crate::{Candle, InstrumentVolume, SeriesKey};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Candle source with bounded rate-limit retries
pub struct RateLimitedClient<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: CandleSource> RateLimitedClient<S> {
    /// Wrap `source` with `policy`
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch candles for `[start_ms, end_ms)` of one series
    ///
    /// # Errors
    /// [`DownloadError::RateLimitExhausted`] when every attempt was rate
    /// limited; [`DownloadError::Fetcher`] for any other remote failure.
    pub async fn fetch_candles(
        &self,
        key: &SeriesKey,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, DownloadError> {
        self.with_retry(key.to_string(), Some((start_ms, end_ms)), move || {
            self.source
                .fetch_candles(&key.instrument, key.interval, start_ms, end_ms)
        })
        .await
    }

    /// List instruments with their daily notional volume
    pub async fn list_instruments(&self) -> Result<Vec<InstrumentVolume>, DownloadError> {
        self.with_retry("instrument list".to_string(), None, move || {
            self.source.list_instruments()
        })
        .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        label: String,
        range: Option<(i64, i64)>,
        mut request: F,
    ) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetcherResult<T>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            match request().await {
                Ok(value) => {
                    if attempt > 1 {
                        let context = self.context(
                            attempt,
                            RetryErrorType::RateLimit,
                            Duration::ZERO,
                            &label,
                            range,
                        );
                        info!("{}", context.format_success());
                    }
                    return Ok(value);
                }
                Err(e) if e.is_rate_limit() => {
                    if attempt >= max_attempts {
                        let context = self.context(
                            attempt,
                            RetryErrorType::RateLimit,
                            Duration::ZERO,
                            &label,
                            range,
                        );
                        error!("{}", context.format_failure());
                        return Err(DownloadError::RateLimitExhausted {
                            key: label,
                            attempts: attempt,
                        });
                    }

                    let delay = self.policy.jittered_delay(attempt);
                    let context = self.context(
                        attempt,
                        RetryErrorType::from_error(&e),
                        delay,
                        &label,
                        range,
                    );
                    warn!(
                        series = %label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{}",
                        context.format_retry()
                    );
                    metrics::record_retry_backoff(delay, attempt);

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        series = %label,
                        attempt,
                        error = %e,
                        kind = RetryErrorType::from_error(&e).description(),
                        "Request failed, not retrying"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    fn context(
        &self,
        attempt: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        label: &str,
        range: Option<(i64, i64)>,
    ) -> RetryContext {
        RetryContext {
            attempt,
            max_attempts: self.policy.max_attempts(),
            error_type,
            backoff_duration,
            series: label.to_string(),
            date_range: range,
        }
    }
}
