use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::etherscan::HTTP_TIMEOUT;
use crate::models::day_start;

pub const ETHERSCAN_CHART_URL: &str = "https://etherscan.io/chart/etherprice?output=csv";
pub const COINGECKO_CHART_URL: &str =
    "https://api.coingecko.com/api/v3/coins/ethereum/market_chart?vs_currency=usd&days=max&interval=daily";

/// ETH/USD price keyed by the UTC midnight of its day.
pub type PriceSeries = BTreeMap<i64, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PriceSource {
    /// Etherscan's daily price chart (CSV)
    Etherscan,
    /// CoinGecko market chart (JSON)
    Coingecko,
}

impl PriceSource {
    pub fn default_url(self) -> &'static str {
        match self {
            PriceSource::Etherscan => ETHERSCAN_CHART_URL,
            PriceSource::Coingecko => COINGECKO_CHART_URL,
        }
    }
}

#[async_trait]
pub trait PriceLookup {
    async fn daily_prices(&self) -> Result<PriceSeries>;
}

pub struct HttpPriceLookup {
    http: reqwest::Client,
    url: Url,
    source: PriceSource,
}

impl HttpPriceLookup {
    pub fn new(source: PriceSource, url: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::PriceUnavailable(format!("failed to build http client: {e}")))?;
        Ok(Self { http, url, source })
    }
}

#[async_trait]
impl PriceLookup for HttpPriceLookup {
    async fn daily_prices(&self) -> Result<PriceSeries> {
        debug!(url = %self.url, "fetching historical ETH prices");

        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::PriceUnavailable(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::PriceUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::PriceUnavailable(format!("HTTP {status} ({text})")));
        }

        match self.source {
            PriceSource::Etherscan => Ok(parse_chart_csv(&text)),
            PriceSource::Coingecko => parse_json_series(&text),
        }
    }
}

/// Parses `"Date(UTC)","UnixTimeStamp","Value"` rows. Anything that is not a
/// three-column data row is skipped.
pub fn parse_chart_csv(text: &str) -> PriceSeries {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut prices = PriceSeries::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping unreadable price row: {}", e);
                continue;
            }
        };
        if record.len() != 3 || &record[2] == "Value" {
            continue;
        }
        match (record[1].trim().parse::<i64>(), record[2].trim().parse::<f64>()) {
            (Ok(timestamp), Ok(price)) => {
                prices.entry(day_start(timestamp)).or_insert(price);
            }
            _ => debug!(row = ?record, "skipping malformed price row"),
        }
    }
    prices
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSeries {
    Chart { prices: Vec<(f64, f64)> },
    Pairs(Vec<(f64, f64)>),
}

/// Parses `[timestamp_ms, price]` pairs, either bare or under `prices`.
/// The first sample of each day wins.
pub fn parse_json_series(text: &str) -> Result<PriceSeries> {
    let series: JsonSeries = serde_json::from_str(text)
        .map_err(|e| Error::PriceUnavailable(format!("malformed price series: {e}")))?;
    let pairs = match series {
        JsonSeries::Chart { prices } => prices,
        JsonSeries::Pairs(pairs) => pairs,
    };

    let mut prices = PriceSeries::new();
    for (timestamp_ms, price) in pairs {
        let seconds = (timestamp_ms / 1000.0).floor() as i64;
        prices.entry(day_start(seconds)).or_insert(price);
    }
    Ok(prices)
}

/// Fetches prices, degrading to `None` unless `strict` is set.
pub async fn load_prices<P>(lookup: &P, strict: bool) -> Result<Option<PriceSeries>>
where
    P: PriceLookup + ?Sized + Sync,
{
    match lookup.daily_prices().await {
        Ok(prices) => Ok(Some(prices)),
        Err(e) if !strict => {
            warn!("{}; reporting without USD columns", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
