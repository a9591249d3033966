use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::models::Transaction;

pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/api";
pub const PAGE_SIZE: usize = 100;
pub const END_BLOCK: u64 = 99_999_999;
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(26);
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

const STATUS_OK: &str = "OK";
const STATUS_NO_TRANSACTIONS: &str = "No transactions found";

/// One page of an address' history, ascending, starting at `start_block`
/// inclusive.
#[async_trait]
pub trait TransactionSource {
    async fn fetch_page(&mut self, address: &str, start_block: u64) -> Result<Vec<Transaction>>;
}

/// Keeps consecutive requests at least `interval` apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    throttle: Throttle,
}

impl EtherscanClient {
    pub fn new(base_url: Url, api_key: impl Into<String>, min_interval: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::upstream(format!("failed to build http client: {e}"), None))?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            throttle: Throttle::new(min_interval.max(MIN_REQUEST_INTERVAL)),
        })
    }
}

#[async_trait]
impl TransactionSource for EtherscanClient {
    async fn fetch_page(&mut self, address: &str, start_block: u64) -> Result<Vec<Transaction>> {
        self.throttle.wait().await;

        let address = address.to_lowercase();
        let start_block = start_block.to_string();
        let end_block = END_BLOCK.to_string();
        let offset = PAGE_SIZE.to_string();
        let params = [
            ("module", "account"),
            ("action", "txlist"),
            ("address", address.as_str()),
            ("startblock", start_block.as_str()),
            ("endblock", end_block.as_str()),
            ("page", "1"),
            ("offset", offset.as_str()),
            ("sort", "asc"),
            ("apikey", self.api_key.as_str()),
        ];

        debug!(%address, %start_block, "requesting etherscan txlist page");

        let resp = self
            .http
            .get(self.base_url.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("request failed: {e}"), None))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::upstream(format!("failed reading response: {e}"), None))?;

        if !status.is_success() {
            return Err(Error::upstream(format!("HTTP {status}"), Some(body)));
        }

        classify_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// Maps a raw `txlist` body onto a page of transactions.
///
/// "No transactions found" is an empty page, not an error.
pub fn classify_response(body: &str) -> Result<Vec<Transaction>> {
    let parsed: TxListResponse = serde_json::from_str(body)
        .map_err(|e| Error::upstream(format!("malformed json: {e}"), Some(body.to_string())))?;

    match parsed.message.as_str() {
        STATUS_OK => serde_json::from_value(parsed.result).map_err(|e| {
            Error::upstream(format!("unexpected result shape: {e}"), Some(body.to_string()))
        }),
        STATUS_NO_TRANSACTIONS => Ok(Vec::new()),
        other => Err(Error::upstream(
            format!("status message {other:?}"),
            Some(body.to_string()),
        )),
    }
}
