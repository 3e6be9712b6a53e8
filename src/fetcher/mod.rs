//! Remote candle sources

use crate::{Candle, InstrumentVolume, Interval};
use async_trait::async_trait;

pub mod hyperliquid;
pub mod hyperliquid_parser;
pub mod retry_formatter;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// The remote asked us to slow down (HTTP 429 or equivalent)
    #[error("rate limited by remote (HTTP {status})")]
    RateLimited {
        /// Status code carried by the rate-limit signal
        status: u16,
    },

    /// Non-success HTTP response other than a rate limit
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Transport failure (DNS, connect, timeout, TLS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Response was well-formed JSON but not what the API documents
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client construction error
    #[error("HTTP client error: {0}")]
    HttpError(String),
}

impl FetcherError {
    /// Whether this error is the remote's rate-limit signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetcherError::RateLimited { .. })
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// A remote source of historical candles.
///
/// Implementations perform exactly one remote call per method invocation and
/// hold no local state that the fetch loop depends on; retrying is the
/// caller's job.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch candles whose open time lies in `[start_ms, end_ms)`, oldest first
    ///
    /// # Arguments
    /// * `instrument` - Instrument identifier (e.g., "BTC")
    /// * `interval` - Candle interval
    /// * `start_ms` - Range start (Unix timestamp in milliseconds, inclusive)
    /// * `end_ms` - Range end (Unix timestamp in milliseconds, exclusive)
    async fn fetch_candles(
        &self,
        instrument: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> FetcherResult<Vec<Candle>>;

    /// List tradable instruments with their daily notional volume, in remote order
    async fn list_instruments(&self) -> FetcherResult<Vec<InstrumentVolume>>;

    /// Human-readable endpoint description for logs
    fn endpoint(&self) -> &str;
}
