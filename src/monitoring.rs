use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::etherscan::HTTP_TIMEOUT;
use crate::models::{DayRow, SECONDS_PER_DAY};

/// A Graphite-style data point as accepted by Grafana Cloud.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub interval: i64,
    pub time: i64,
}

pub fn metric_points(alias: &str, days: &[DayRow]) -> Vec<MetricPoint> {
    let point = |metric: &str, value: f64, time: i64| MetricPoint {
        name: format!("petrometer.{alias}.{metric}"),
        value,
        interval: SECONDS_PER_DAY,
        time,
    };

    let mut points = Vec::with_capacity(days.len() * 5);
    for day in days {
        points.push(point("tx_count", day.tx_count as f64, day.timestamp));
        points.push(point("failed_tx_count", day.failed_tx_count as f64, day.timestamp));
        points.push(point("avg_gas_price_gwei", day.avg_gas_price_gwei, day.timestamp));
        points.push(point("total_gas_cost_eth", day.total_gas_cost_eth, day.timestamp));
        if let Some(usd) = day.total_cost_usd {
            points.push(point("total_cost_usd", usd, day.timestamp));
        }
    }
    points
}

pub struct MonitoringSink {
    http: reqwest::Client,
    url: Url,
    key: String,
}

impl MonitoringSink {
    pub fn new(url: Url, key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            url,
            key: key.into(),
        })
    }

    pub async fn push(&self, points: &[MetricPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let resp = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.key)
            .json(points)
            .send()
            .await
            .context("failed to post metrics")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("monitoring endpoint returned {}: {}", status, body);
        }

        info!(count = points.len(), url = %self.url, "pushed metrics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(total_cost_usd: Option<f64>) -> DayRow {
        DayRow {
            day: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            timestamp: 1_514_764_800,
            tx_count: 3,
            failed_tx_count: 1,
            failed_pct: 33.3,
            avg_gas_price_gwei: 4.0,
            avg_gas_cost_eth: 0.1,
            total_gas_cost_eth: 0.3,
            eth_price: total_cost_usd.map(|_| 1.0),
            avg_cost_usd: total_cost_usd.map(|v| v / 3.0),
            total_cost_usd,
        }
    }

    #[test]
    fn one_point_per_metric_and_day() {
        let points = metric_points("ops", &[row(None), row(Some(0.3))]);
        assert_eq!(points.len(), 9);
        assert_eq!(points[0].name, "petrometer.ops.tx_count");
        assert_eq!(points[0].value, 3.0);
        assert_eq!(points[0].interval, 86_400);
        assert_eq!(points[0].time, 1_514_764_800);
        assert_eq!(points[8].name, "petrometer.ops.total_cost_usd");
    }

    #[test]
    fn serializes_wire_shape() {
        let points = metric_points("ops", &[row(None)]);
        let json = serde_json::to_value(&points[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "petrometer.ops.tx_count",
                "value": 3.0,
                "interval": 86400,
                "time": 1514764800
            })
        );
    }
}
