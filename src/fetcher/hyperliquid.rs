//! Hyperliquid `/info` HTTP client
//!
//! Every public query is a POST to `/info` with a JSON body. This client makes
//! exactly one request per call and classifies the outcome:
//! - 429 becomes [`FetcherError::RateLimited`] so the caller can back off
//! - any other non-success status becomes [`FetcherError::ApiError`]
//! - transport failures become [`FetcherError::NetworkError`]

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use super::hyperliquid_parser::HyperliquidParser;
use super::{CandleSource, FetcherError, FetcherResult};
use crate::metrics::HttpRequestMetrics;
use crate::{Candle, InstrumentVolume, Interval};

/// Hyperliquid mainnet REST base URL
pub const HYPERLIQUID_BASE_URL: &str = "https://api.hyperliquid.xyz";

/// Path of the info endpoint
pub const INFO_PATH: &str = "/info";

/// Most candles `candleSnapshot` returns for one request; longer ranges are
/// silently truncated by the remote
pub const MAX_CANDLES_PER_REQUEST: usize = 5_000;

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest error body kept in an [`FetcherError::ApiError`]
const MAX_ERROR_BODY: usize = 512;

/// Candle source backed by the Hyperliquid info API
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    info_url: String,
}

impl HyperliquidClient {
    /// Create a client for `base_url` (e.g. <https://api.hyperliquid.xyz>)
    ///
    /// # Arguments
    /// * `base_url` - Scheme and host, without the `/info` path
    /// * `timeout` - Overall per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|e| FetcherError::HttpError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            info_url: format!("{}{}", base_url.trim_end_matches('/'), INFO_PATH),
        }
    }

    /// Full URL of the info endpoint
    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    /// POST a query to `/info` and return the decoded JSON body
    async fn post_info(&self, request_type: &'static str, body: &Value) -> FetcherResult<Value> {
        let metrics = HttpRequestMetrics::start(request_type);
        let started = Instant::now();

        let response = match self.client.post(&self.info_url).json(body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                metrics.record_network_error();
                return Err(FetcherError::NetworkError(e.to_string()));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if status.as_u16() == 429 {
            return Err(FetcherError::RateLimited {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let mut text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(FetcherError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to decode {request_type}: {e}")))?;

        debug!(
            request_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Info request succeeded"
        );
        Ok(value)
    }
}

/// Build the `candleSnapshot` request body.
///
/// The remote treats `endTime` inclusively, so the half-open range
/// `[start_ms, end_ms)` is sent as `[start_ms, end_ms - 1]`.
pub fn candle_snapshot_body(instrument: &str, interval: Interval, start_ms: i64, end_ms: i64) -> Value {
    json!({
        "type": "candleSnapshot",
        "req": {
            "coin": instrument,
            "interval": interval.as_str(),
            "startTime": start_ms,
            "endTime": (end_ms - 1).max(start_ms),
        }
    })
}

/// Reject a full-size response that stops short of `end_ms`.
///
/// Storing it and moving on would leave a permanent gap behind the checkpoint.
pub fn check_not_truncated(candles: &[Candle], interval: Interval, end_ms: i64) -> FetcherResult<()> {
    if candles.len() < MAX_CANDLES_PER_REQUEST {
        return Ok(());
    }
    match candles.last() {
        Some(last) if last.open_time + interval.to_milliseconds() < end_ms => {
            Err(FetcherError::InvalidResponse(format!(
                "candleSnapshot returned {} {interval} candles ending at {}, short of {end_ms}; \
                 reduce chunk_hours",
                candles.len(),
                last.open_time
            )))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl CandleSource for HyperliquidClient {
    async fn fetch_candles(
        &self,
        instrument: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> FetcherResult<Vec<Candle>> {
        let body = candle_snapshot_body(instrument, interval, start_ms, end_ms);
        let value = self.post_info("candleSnapshot", &body).await?;

        let mut candles = HyperliquidParser::parse_candles(value)?;
        check_not_truncated(&candles, interval, end_ms)?;
        candles.retain(|c| c.open_time >= start_ms && c.open_time < end_ms);
        Ok(candles)
    }

    async fn list_instruments(&self) -> FetcherResult<Vec<InstrumentVolume>> {
        let body = json!({ "type": "metaAndAssetCtxs" });
        let value = self.post_info("metaAndAssetCtxs", &body).await?;
        HyperliquidParser::parse_meta_and_asset_ctxs(value)
    }

    fn endpoint(&self) -> &str {
        &self.info_url
    }
}
