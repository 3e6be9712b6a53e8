//! Top-N instrument selection by daily notional volume

use crate::support::{Fallback, ScriptedSource};
use candle_backfill::downloader::{RateLimitedClient, RetryPolicy};
use candle_backfill::selector::{select_instruments, select_top_instruments};
use candle_backfill::InstrumentVolume;
use std::time::Duration;

fn volumes(entries: &[(&str, f64)]) -> Vec<InstrumentVolume> {
    entries
        .iter()
        .map(|(name, v)| InstrumentVolume {
            name: name.to_string(),
            day_notional_volume: *v,
        })
        .collect()
}

fn names(list: &[InstrumentVolume]) -> Vec<&str> {
    list.iter().map(|i| i.name.as_str()).collect()
}

#[test]
fn test_top_n_by_volume() {
    let listed = volumes(&[
        ("SOL", 300.0),
        ("BTC", 1_000.0),
        ("DOGE", 5.0),
        ("ETH", 800.0),
    ]);

    let top = select_top_instruments(listed, 3);
    assert_eq!(names(&top), vec!["BTC", "ETH", "SOL"]);
}

#[test]
fn test_ties_keep_remote_order() {
    let listed = volumes(&[("AAA", 10.0), ("BBB", 20.0), ("CCC", 10.0), ("DDD", 10.0)]);

    let top = select_top_instruments(listed, 3);
    assert_eq!(names(&top), vec!["BBB", "AAA", "CCC"]);
}

#[test]
fn test_nan_volume_ranks_last() {
    let listed = volumes(&[("NAN", f64::NAN), ("LOW", 0.0), ("INF", f64::INFINITY)]);

    let top = select_top_instruments(listed, 10);
    assert_eq!(names(&top), vec!["LOW", "NAN", "INF"]);
}

#[tokio::test(start_paused = true)]
async fn test_select_through_client() {
    let source = ScriptedSource::new(Fallback::Candles).with_instruments(&[
        ("BTC", 2.0e9),
        ("HYPE", 5.0e8),
        ("ETH", 1.0e9),
    ]);
    let client = RateLimitedClient::new(
        source,
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(2), Duration::ZERO),
    );

    let selected = select_instruments(&client, 2).await.unwrap();
    assert_eq!(selected, vec!["BTC", "ETH"]);
    assert_eq!(client.source().listings(), 1);
}
