//! Series key: the (instrument, interval) pair a checkpoint and a dataset belong to

use crate::Interval;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies one candle series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Instrument identifier (e.g. "BTC")
    pub instrument: String,
    /// Candle interval
    pub interval: Interval,
}

impl SeriesKey {
    /// Create a new series key
    pub fn new(instrument: impl Into<String>, interval: Interval) -> Self {
        Self {
            instrument: instrument.into(),
            interval,
        }
    }

    /// Checkpoint file key, `"{instrument}_{interval}"`
    pub fn checkpoint_key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.instrument, self.interval)
    }
}

impl FromStr for SeriesKey {
    type Err = String;

    /// Accepts both `BTC_1m` and the older `BTC-1m` spelling. The split is on
    /// the last separator so instruments may themselves contain one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (instrument, interval) = s
            .rsplit_once('_')
            .or_else(|| s.rsplit_once('-'))
            .ok_or_else(|| format!("Invalid series key: {s}"))?;

        if instrument.is_empty() {
            return Err(format!("Invalid series key (empty instrument): {s}"));
        }

        Ok(Self {
            instrument: instrument.to_string(),
            interval: Interval::from_str(interval)?,
        })
    }
}
