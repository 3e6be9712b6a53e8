//! Instrument selection by daily notional volume

use crate::downloader::client::RateLimitedClient;
use crate::downloader::DownloadError;
use crate::fetcher::CandleSource;
use crate::InstrumentVolume;
use std::cmp::Ordering;
use tracing::info;

/// Rank instruments by daily notional volume, highest first, and keep the
/// first `max_count`.
///
/// The sort is stable, so equal volumes keep the order the remote listed
/// them in. Non-finite volumes rank below every finite one.
pub fn select_top_instruments(
    mut instruments: Vec<InstrumentVolume>,
    max_count: usize,
) -> Vec<InstrumentVolume> {
    instruments.sort_by(by_volume_desc);
    instruments.truncate(max_count);
    instruments
}

fn by_volume_desc(a: &InstrumentVolume, b: &InstrumentVolume) -> Ordering {
    rank(b.day_notional_volume).total_cmp(&rank(a.day_notional_volume))
}

fn rank(volume: f64) -> f64 {
    if volume.is_finite() {
        volume
    } else {
        f64::NEG_INFINITY
    }
}

/// Query the remote for its instrument list and return the names of the top
/// `max_count` by volume.
pub async fn select_instruments<S: CandleSource>(
    client: &RateLimitedClient<S>,
    max_count: usize,
) -> Result<Vec<String>, DownloadError> {
    let listed = client.list_instruments().await?;
    let listed_count = listed.len();

    let selected: Vec<String> = select_top_instruments(listed, max_count)
        .into_iter()
        .map(|i| i.name)
        .collect();

    info!(
        listed = listed_count,
        selected = selected.len(),
        instruments = ?selected,
        "Selected instruments by daily notional volume"
    );
    Ok(selected)
}
