use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::models::{
    day_date, DayRow, Direction, Totals, Transaction, WEI_PER_ETH, WEI_PER_GWEI,
};
use crate::prices::PriceSeries;

#[derive(Debug, Clone, Serialize)]
pub struct GasReport {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub direction: Direction,
    pub days: Vec<DayRow>,
    pub totals: Totals,
}

impl GasReport {
    pub fn build(
        address: &str,
        alias: Option<&str>,
        direction: Direction,
        txs: &[Transaction],
        prices: Option<&PriceSeries>,
    ) -> Self {
        let days = daily_rows(txs, prices);
        let totals = totals(&days, prices.is_some());
        Self {
            address: address.to_string(),
            alias: alias.map(str::to_string),
            direction,
            days,
            totals,
        }
    }
}

/// One row per UTC day that has transactions, ordered by day.
pub fn daily_rows(txs: &[Transaction], prices: Option<&PriceSeries>) -> Vec<DayRow> {
    let mut by_day: BTreeMap<i64, Vec<&Transaction>> = BTreeMap::new();
    for tx in txs {
        by_day.entry(tx.day()).or_default().push(tx);
    }

    by_day
        .into_iter()
        .map(|(day, day_txs)| {
            let count = day_txs.len();
            let failed = day_txs.iter().filter(|tx| tx.is_failed()).count();
            let gas_price_sum: u128 = day_txs.iter().map(|tx| u128::from(tx.gas_price)).sum();
            let gas_cost_sum: u128 = day_txs.iter().map(|tx| tx.gas_cost_wei()).sum();

            let avg_gas_cost_eth = gas_cost_sum as f64 / count as f64 / WEI_PER_ETH;
            let total_gas_cost_eth = gas_cost_sum as f64 / WEI_PER_ETH;
            let eth_price = prices.and_then(|p| p.get(&day).copied());

            DayRow {
                day: day_date(day),
                timestamp: day,
                tx_count: count,
                failed_tx_count: failed,
                failed_pct: failed as f64 * 100.0 / count as f64,
                avg_gas_price_gwei: gas_price_sum as f64 / count as f64 / WEI_PER_GWEI,
                avg_gas_cost_eth,
                total_gas_cost_eth,
                eth_price,
                avg_cost_usd: eth_price.map(|p| avg_gas_cost_eth * p),
                total_cost_usd: eth_price.map(|p| total_gas_cost_eth * p),
            }
        })
        .collect()
}

/// Days without a price contribute nothing to the USD total.
pub fn totals(days: &[DayRow], priced: bool) -> Totals {
    Totals {
        tx_count: days.iter().map(|d| d.tx_count).sum(),
        total_gas_cost_eth: days.iter().map(|d| d.total_gas_cost_eth).sum(),
        total_cost_usd: priced.then(|| days.iter().filter_map(|d| d.total_cost_usd).sum()),
    }
}

const HEADERS: [&str; 9] = [
    "Day",
    "All tx",
    "Failed tx",
    "(%)",
    "Average gas price",
    "Average tx cost",
    "($)",
    "Total tx cost",
    "($)",
];
const WIDTHS: [usize; 9] = [11, 10, 10, 8, 20, 20, 12, 20, 14];
const USD_COLUMNS: [usize; 2] = [6, 8];

pub fn render_table(report: &GasReport) -> String {
    let mut out = String::new();
    let direction = match report.direction {
        Direction::Outgoing => "",
        Direction::Incoming => " (incoming)",
    };
    let name = match &report.alias {
        Some(alias) => format!("{} [{}]", report.address, alias),
        None => report.address.clone(),
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "Gas usage summary for: {name}{direction}");
    let _ = writeln!(out);

    // USD columns only appear when prices were available.
    let priced = report.totals.total_cost_usd.is_some();
    let columns: Vec<usize> = (0..HEADERS.len())
        .filter(|&i| priced || !USD_COLUMNS.contains(&i))
        .collect();

    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    push_row(&mut out, &header, &columns);
    let rule_width =
        columns.iter().map(|&i| WIDTHS[i]).sum::<usize>() + 3 * (columns.len() - 1);
    let _ = writeln!(out, "{}", "=".repeat(rule_width));

    for day in &report.days {
        let cells = vec![
            day.day.format("%Y-%m-%d").to_string(),
            day.tx_count.to_string(),
            day.failed_tx_count.to_string(),
            format!("({:.1} %)", day.failed_pct),
            format!("{:.1} GWei", day.avg_gas_price_gwei),
            format!("{:.8} ETH", day.avg_gas_cost_eth),
            day.avg_cost_usd
                .map(|usd| format!("({})", format_usd(usd)))
                .unwrap_or_default(),
            format!("{:.8} ETH", day.total_gas_cost_eth),
            day.total_cost_usd
                .map(|usd| format!("({})", format_usd(usd)))
                .unwrap_or_default(),
        ];
        push_row(&mut out, &cells, &columns);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Number of transactions: {}", report.totals.tx_count);
    match report.totals.total_cost_usd {
        Some(usd) => {
            let _ = writeln!(
                out,
                "Total gas cost: {:.8} ETH ({})",
                report.totals.total_gas_cost_eth,
                format_usd(usd)
            );
        }
        None => {
            let _ = writeln!(
                out,
                "Total gas cost: {:.8} ETH",
                report.totals.total_gas_cost_eth
            );
        }
    }
    let _ = writeln!(out);
    out
}

fn push_row(out: &mut String, cells: &[String], columns: &[usize]) {
    let line: Vec<String> = columns
        .iter()
        .map(|&i| {
            let (cell, width) = (&cells[i], WIDTHS[i]);
            if i == 0 {
                format!("{cell:<width$}")
            } else {
                format!("{cell:>width$}")
            }
        })
        .collect();
    let _ = writeln!(out, "{}", line.join("   ").trim_end());
}

pub fn render_json(reports: &[GasReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

/// Formats as `$#,##0.00`.
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}
