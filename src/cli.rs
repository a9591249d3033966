use std::path::PathBuf;

use clap::Parser;

use crate::prices::PriceSource;

#[derive(Parser, Debug)]
#[command(name = "petrometer", version, about = "Daily gas usage report for Ethereum addresses")]
pub struct Cli {
    /// Ethereum addresses to get the gas usage of
    #[arg(required = true, value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Etherscan API key (falls back to ETHERSCAN_API_KEY)
    #[arg(long)]
    pub etherscan_api_key: Option<String>,

    /// Report incoming instead of outgoing transactions
    #[arg(long)]
    pub incoming: bool,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Name used in report headers and metric names (single address only)
    #[arg(long)]
    pub alias: Option<String>,

    /// Endpoint receiving daily metrics as JSON points
    #[arg(long)]
    pub monitoring_url: Option<String>,

    /// Bearer token for the monitoring endpoint
    #[arg(long)]
    pub monitoring_key: Option<String>,

    /// First block to scan when the local cache is empty
    #[arg(long, default_value_t = 0)]
    pub start_block: u64,

    /// Directory holding the per-address transaction caches
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Where historical ETH prices come from
    #[arg(long, value_enum, default_value_t = PriceSource::Etherscan)]
    pub price_source: PriceSource,

    /// Fail instead of omitting USD columns when prices cannot be fetched
    #[arg(long, conflicts_with = "no_prices")]
    pub strict_prices: bool,

    /// Skip the price lookup entirely
    #[arg(long)]
    pub no_prices: bool,
}
