use anyhow::{ensure, Context, Result};
use tracing::{info, warn};

use crate::config::{Config, OutputMode};
use crate::etherscan::{EtherscanClient, TransactionSource};
use crate::monitoring::{metric_points, MonitoringSink};
use crate::prices::{load_prices, HttpPriceLookup, PriceSeries};
use crate::report::{render_json, render_table, GasReport};
use crate::sync::sync_address;

/// Synchronizes every configured address, prices the result and renders it.
///
/// Addresses are processed one after another; the first failure aborts the
/// run without rendering anything.
pub async fn build_reports(config: &Config) -> Result<Vec<GasReport>> {
    let mut client = EtherscanClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.min_request_interval,
    )
    .context("failed to build etherscan client")?;

    build_reports_with(config, &mut client).await
}

pub async fn build_reports_with<F>(config: &Config, source: &mut F) -> Result<Vec<GasReport>>
where
    F: TransactionSource + Send,
{
    // Metric names are keyed by alias; sharing one would merge the series.
    ensure!(
        config.alias.is_none() || config.addresses.len() <= 1,
        "an alias can only name a single address"
    );

    let mut synced = Vec::with_capacity(config.addresses.len());
    for address in &config.addresses {
        info!(%address, "fetching new transactions from etherscan");
        let (txs, outcome) = sync_address(
            &config.cache_dir,
            source,
            address,
            config.direction,
            config.start_block,
        )
        .await
        .with_context(|| format!("failed to synchronize transactions of {address}"))?;
        info!(
            %address,
            pages = outcome.pages_fetched,
            inserted = outcome.inserted,
            selected = txs.len(),
            "synchronization finished"
        );
        synced.push((address, txs));
    }

    let prices = fetch_prices(config).await?;

    Ok(synced
        .into_iter()
        .map(|(address, txs)| {
            GasReport::build(
                address,
                config.alias.as_deref(),
                config.direction,
                &txs,
                prices.as_ref(),
            )
        })
        .collect())
}

async fn fetch_prices(config: &Config) -> Result<Option<PriceSeries>> {
    let Some(price_config) = &config.prices else {
        return Ok(None);
    };
    let lookup = HttpPriceLookup::new(price_config.source, price_config.url.clone())?;
    let prices = load_prices(&lookup, price_config.strict)
        .await
        .context("price lookup failed")?;
    Ok(prices)
}

pub fn render(config: &Config, reports: &[GasReport]) -> Result<String> {
    match config.output {
        OutputMode::Table => Ok(reports.iter().map(render_table).collect()),
        OutputMode::Json => {
            let mut out = render_json(reports).context("failed to serialize report")?;
            out.push('\n');
            Ok(out)
        }
    }
}

/// Writes the rendered report to the configured file or stdout.
pub fn deliver(config: &Config, rendered: &str) -> Result<()> {
    match &config.output_path {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed writing report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Posts daily metrics when a monitoring endpoint is configured. Failures are
/// logged and never fail the run.
pub async fn export_metrics(config: &Config, reports: &[GasReport]) {
    let Some(monitoring) = &config.monitoring else {
        return;
    };
    let sink = match MonitoringSink::new(monitoring.url.clone(), monitoring.key.clone()) {
        Ok(sink) => sink,
        Err(e) => {
            warn!("monitoring disabled: {:#}", e);
            return;
        }
    };

    for report in reports {
        let alias = report.alias.as_deref().unwrap_or(&report.address);
        let points = metric_points(alias, &report.days);
        if let Err(e) = sink.push(&points).await {
            warn!(address = %report.address, "failed exporting metrics: {:#}", e);
        }
    }
}

pub async fn run(config: &Config) -> Result<()> {
    let reports = build_reports(config).await?;
    let rendered = render(config, &reports)?;
    deliver(config, &rendered)?;
    export_metrics(config, &reports).await;
    Ok(())
}
