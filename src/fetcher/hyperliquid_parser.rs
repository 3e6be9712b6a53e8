//! Hyperliquid response parser
//!
//! Stateless conversion of `/info` JSON payloads into typed data. Prices and
//! volumes arrive as decimal strings and are parsed to `f64` here, once; open
//! and close times arrive as integer milliseconds and stay that way.

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{Candle, InstrumentVolume};
use serde::Deserialize;
use serde_json::Value;

/// Raw candle returned by `candleSnapshot`:
///
/// ```json
/// {"t":1672531200000,"T":1672531259999,"s":"BTC","i":"1m","o":"16500.0","c":"16550.0","h":"16600.0","l":"16400.0","v":"1234.56","n":42}
/// ```
///
/// Unknown fields (`s`, `i`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidCandleRaw {
    /// Open time in milliseconds since epoch
    pub t: i64,
    /// Close time in milliseconds since epoch
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Open price
    pub o: String,
    /// High price
    pub h: String,
    /// Low price
    pub l: String,
    /// Close price
    pub c: String,
    /// Volume
    pub v: String,
    /// Trade count
    #[serde(default)]
    pub n: u64,
}

impl HyperliquidCandleRaw {
    /// Convert into a validated [`Candle`]
    pub fn try_into_candle(self) -> FetcherResult<Candle> {
        let candle = Candle {
            open_time: self.t,
            close_time: self.close_time,
            open: HyperliquidParser::parse_number(&self.o, "o")?,
            high: HyperliquidParser::parse_number(&self.h, "h")?,
            low: HyperliquidParser::parse_number(&self.l, "l")?,
            close: HyperliquidParser::parse_number(&self.c, "c")?,
            volume: HyperliquidParser::parse_number(&self.v, "v")?,
            trades: self.n,
        };

        candle
            .validate()
            .map_err(|e| FetcherError::InvalidResponse(format!("candle t={}: {e}", self.t)))?;
        Ok(candle)
    }
}

/// Stateless parser for Hyperliquid `/info` responses
pub struct HyperliquidParser;

impl HyperliquidParser {
    /// Parse a `candleSnapshot` response body into candles sorted by open time
    ///
    /// # Errors
    /// Returns `FetcherError::ParseError` if the body is not an array of candle
    /// objects, and `FetcherError::InvalidResponse` if a candle fails validation.
    pub fn parse_candles(body: Value) -> FetcherResult<Vec<Candle>> {
        let raw: Vec<HyperliquidCandleRaw> = serde_json::from_value(body)
            .map_err(|e| FetcherError::ParseError(format!("candleSnapshot: {e}")))?;

        let mut candles = raw
            .into_iter()
            .map(HyperliquidCandleRaw::try_into_candle)
            .collect::<FetcherResult<Vec<_>>>()?;

        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    /// Parse a `metaAndAssetCtxs` response into per-instrument volumes
    ///
    /// # Format
    /// `[{"universe": [{"name": "BTC", ...}, ...]}, [{"dayNtlVlm": "123.4", ...}, ...]]`,
    /// where the two arrays are aligned by index. Delisted instruments are skipped.
    pub fn parse_meta_and_asset_ctxs(body: Value) -> FetcherResult<Vec<InstrumentVolume>> {
        let parts = body.as_array().ok_or_else(|| {
            FetcherError::ParseError("metaAndAssetCtxs: expected a two-element array".to_string())
        })?;

        if parts.len() != 2 {
            return Err(FetcherError::ParseError(format!(
                "metaAndAssetCtxs: expected 2 elements, got {}",
                parts.len()
            )));
        }

        let universe = parts[0]
            .get("universe")
            .and_then(|v| v.as_array())
            .ok_or_else(|| FetcherError::ParseError("Missing or invalid universe".to_string()))?;

        let contexts = parts[1].as_array().ok_or_else(|| {
            FetcherError::ParseError("Missing or invalid asset contexts".to_string())
        })?;

        if universe.len() != contexts.len() {
            return Err(FetcherError::InvalidResponse(format!(
                "universe has {} entries but asset contexts has {}",
                universe.len(),
                contexts.len()
            )));
        }

        let mut instruments = Vec::with_capacity(universe.len());
        for (asset, ctx) in universe.iter().zip(contexts) {
            let name = asset
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| FetcherError::ParseError("Missing or invalid name".to_string()))?;

            if asset
                .get("isDelisted")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                continue;
            }

            let day_notional_volume = match ctx.get("dayNtlVlm") {
                Some(Value::String(s)) => Self::parse_number(s, "dayNtlVlm")?,
                Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
                    FetcherError::ParseError(format!("Invalid dayNtlVlm for {name}"))
                })?,
                _ => {
                    return Err(FetcherError::ParseError(format!(
                        "Missing dayNtlVlm for {name}"
                    )))
                }
            };

            instruments.push(InstrumentVolume {
                name: name.to_string(),
                day_notional_volume,
            });
        }

        Ok(instruments)
    }

    /// Parse a decimal string field
    pub fn parse_number(raw: &str, field: &str) -> FetcherResult<f64> {
        raw.trim()
            .parse::<f64>()
            .map_err(|e| FetcherError::ParseError(format!("Invalid {field} '{raw}': {e}")))
    }
}
