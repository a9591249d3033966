use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ethers_core::types::Address;
use url::Url;

use crate::cli::Cli;
use crate::etherscan::{DEFAULT_API_URL, MIN_REQUEST_INTERVAL};
use crate::models::Direction;
use crate::prices::PriceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub source: PriceSource,
    pub url: Url,
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub url: Url,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Lower-case `0x` hex, validated.
    pub addresses: Vec<String>,
    pub api_key: String,
    pub api_url: Url,
    pub direction: Direction,
    pub output: OutputMode,
    pub output_path: Option<PathBuf>,
    pub alias: Option<String>,
    pub monitoring: Option<MonitoringConfig>,
    pub cache_dir: PathBuf,
    pub start_block: u64,
    pub prices: Option<PriceConfig>,
    pub min_request_interval: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing etherscan api key (--etherscan-api-key or ETHERSCAN_API_KEY)")]
    MissingApiKey,
    #[error("invalid ethereum address: {0}")]
    InvalidAddress(String),
    #[error("invalid {name} url {value:?}: {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("--alias names a single address, but {0} addresses were given")]
    AliasWithManyAddresses(usize),
    #[error("--monitoring-url and --monitoring-key must be given together")]
    IncompleteMonitoring,
    #[error("cannot determine a cache directory; set --cache-dir or PETROMETER_CACHE_DIR")]
    NoCacheDir,
}

impl Config {
    /// Merges command line arguments with environment fallbacks.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let addresses = cli
            .addresses
            .iter()
            .map(|raw| normalize_address(raw))
            .collect::<Result<Vec<_>, _>>()?;
        if cli.alias.is_some() && addresses.len() > 1 {
            return Err(ConfigError::AliasWithManyAddresses(addresses.len()));
        }

        let api_key = cli
            .etherscan_api_key
            .or_else(|| env::var("ETHERSCAN_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let api_url = parse_url(
            "etherscan api",
            &env::var("ETHERSCAN_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        )?;

        let monitoring_url = cli
            .monitoring_url
            .or_else(|| env::var("PETROMETER_MONITORING_URL").ok());
        let monitoring_key = cli
            .monitoring_key
            .or_else(|| env::var("PETROMETER_MONITORING_KEY").ok());
        let monitoring = match (monitoring_url, monitoring_key) {
            (Some(url), Some(key)) => Some(MonitoringConfig {
                url: parse_url("monitoring", &url)?,
                key,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteMonitoring),
        };

        let cache_dir = match cli.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir().ok_or(ConfigError::NoCacheDir)?,
        };

        let prices = if cli.no_prices {
            None
        } else {
            let url = env::var("PETROMETER_PRICE_URL")
                .unwrap_or_else(|_| cli.price_source.default_url().to_string());
            Some(PriceConfig {
                source: cli.price_source,
                url: parse_url("price", &url)?,
                strict: cli.strict_prices,
            })
        };

        Ok(Self {
            addresses,
            api_key,
            api_url,
            direction: if cli.incoming {
                Direction::Incoming
            } else {
                Direction::Outgoing
            },
            output: if cli.json {
                OutputMode::Json
            } else {
                OutputMode::Table
            },
            output_path: cli.output,
            alias: cli.alias,
            monitoring,
            cache_dir,
            start_block: cli.start_block,
            prices,
            min_request_interval: MIN_REQUEST_INTERVAL,
        })
    }
}

pub fn normalize_address(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != 40 {
        return Err(ConfigError::InvalidAddress(raw.to_string()));
    }
    let address =
        Address::from_str(hex).map_err(|_| ConfigError::InvalidAddress(raw.to_string()))?;
    Ok(format!("0x{:x}", address))
}

fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("PETROMETER_CACHE_DIR") {
        return Some(PathBuf::from(dir));
    }
    let base = env::var("XDG_CACHE_HOME")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var("HOME").ok().map(|home| PathBuf::from(home).join(".cache")))?;
    Some(base.join("petrometer"))
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        source,
    })
}
