//! `top` command: instruments ranked by daily notional volume

use crate::downloader::{RateLimitedClient, RetryPolicy};
use crate::fetcher::hyperliquid::HyperliquidClient;
use crate::selector::select_top_instruments;
use clap::Args;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};

/// List the most traded instruments
#[derive(Args, Debug)]
pub struct TopCommand {
    /// Number of instruments to show
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,
}

impl TopCommand {
    /// Query the remote and print the ranking
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        if self.limit == 0 {
            return Err(CliError::InvalidArgument(
                "--limit must be at least 1".to_string(),
            ));
        }

        let config = cli.load_config()?;
        let source = HyperliquidClient::new(&config.base_url, config.http_timeout())?;
        let client = RateLimitedClient::new(source, RetryPolicy::from_config(&config.retry));

        let ranked = select_top_instruments(client.list_instruments().await?, self.limit);

        match cli.output_format {
            OutputFormat::Json => {
                let rows: Vec<_> = ranked
                    .iter()
                    .enumerate()
                    .map(|(i, inst)| {
                        json!({
                            "rank": i + 1,
                            "instrument": inst.name,
                            "day_notional_volume": inst.day_notional_volume,
                        })
                    })
                    .collect();
                let text = serde_json::to_string_pretty(&rows).map_err(|e| {
                    CliError::InvalidArgument(format!("Failed to serialize ranking: {e}"))
                })?;
                println!("{text}");
            }
            OutputFormat::Human => {
                println!("Top {} instruments by daily notional volume:\n", ranked.len());
                for (i, inst) in ranked.iter().enumerate() {
                    println!(
                        "{:>3}. {:<12} {:>20.2}",
                        i + 1,
                        inst.name,
                        inst.day_notional_volume
                    );
                }
            }
        }
        Ok(())
    }
}
