//! Retry message formatting
//!
//! Keeps the wording of retry, recovery and final-failure log lines in one
//! place so every call site reports attempt counters, the reason, the wait
//! and the series/date range the same way.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::FetcherError;

/// Classification of remote failures for user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Transport failure
    Network,
    /// Malformed or unexpected payload
    BadPayload,
}

impl RetryErrorType {
    /// Classify a fetcher error
    pub fn from_error(error: &FetcherError) -> Self {
        match error {
            FetcherError::RateLimited { .. } => Self::RateLimit,
            FetcherError::ApiError { status, .. } => match *status {
                401 | 403 => Self::AuthFailed(*status),
                s if s >= 500 => Self::ServerError(s),
                s => Self::ClientError(s),
            },
            FetcherError::NetworkError(_) | FetcherError::HttpError(_) => Self::Network,
            FetcherError::ParseError(_) | FetcherError::InvalidResponse(_) => Self::BadPayload,
        }
    }

    /// User-friendly description used inside log messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(code) => match code {
                404 => "resource not found",
                422 => "request rejected",
                _ => "client error",
            },
            Self::Network => "network error",
            Self::BadPayload => "malformed response",
        }
    }

    /// Suggested remediation printed after a final failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::RateLimit => "Increase api_sleep_secs or the retry delays, then re-run to resume",
            Self::ServerError(_) => "The exchange may be degraded; re-run later to resume",
            Self::AuthFailed(_) => "Check network egress restrictions for the info endpoint",
            Self::ClientError(_) => "Check instrument names and intervals for typos",
            Self::Network => "Check network connectivity and DNS, then re-run to resume",
            Self::BadPayload => "The API response format may have changed",
        }
    }
}

/// Context for formatting retry messages
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// Series being fetched (e.g., "BTC_1m"), empty for non-series calls
    pub series: String,
    /// Requested range (start, end) in millis
    pub date_range: Option<(i64, i64)>,
}

impl RetryContext {
    /// Format the "waiting before next attempt" message
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_series_and_range(&mut message, &self.series, self.date_range);
        message
    }

    /// Format the "recovered after N attempts" message
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Attempt {}/{} succeeded - resuming",
            self.attempt, self.max_attempts
        );
        append_series_and_range(&mut message, &self.series, self.date_range);
        message
    }

    /// Format the final failure summary with suggestions
    pub fn format_failure(&self) -> String {
        let series = if self.series.is_empty() {
            "n/a"
        } else {
            &self.series
        };
        let range = self
            .date_range
            .map(|(start, end)| format!("{} to {}", format_timestamp(start), format_timestamp(end)))
            .unwrap_or_else(|| "n/a".to_string());

        [
            format!("[FAILED] Gave up after {} attempts", self.max_attempts),
            format!("  Last error: {}", self.error_type.description()),
            format!("  Series: {series}"),
            format!("  Range: {range}"),
            "  Suggestions:".to_string(),
            format!("    - {}", self.error_type.suggestion()),
            format!(
                "    - Raise retry.max_attempts (current: {})",
                self.max_attempts
            ),
        ]
        .join("\n")
    }
}

fn append_series_and_range(buffer: &mut String, series: &str, date_range: Option<(i64, i64)>) {
    if !series.is_empty() {
        buffer.push_str(&format!(" ({series})"));
    }

    if let Some((start, end)) = date_range {
        buffer.push_str(&format!(
            " {} to {}",
            format_timestamp(start),
            format_timestamp(end)
        ));
    }
}

/// Render a millisecond timestamp as a UTC datetime
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| format!("{millis}ms"))
}
