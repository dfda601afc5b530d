//! Which pairs a scanner looks at.

use crate::klines::FetchError;
use crate::rules::{Side, SideFilter};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const ACTIVE_INSTRUMENTS_URL: &str =
    "https://api.coindcx.com/exchange/v1/derivatives/futures/data/active_instruments";
const STATS_URL: &str = "https://api.coindcx.com/api/v1/derivatives/futures/data/stats";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Universe {
    /// Every active futures instrument for the margin currency.
    #[default]
    Active,
    Fixed { pairs: Vec<String> },
    /// Ranked by 24h change: the top `take` gainers (after skipping `skip`)
    /// are scanned for BUY only, the same slice of losers for SELL only.
    TopMovers { skip: usize, take: usize },
}

/// Pairs to scan and the sides each one is scanned for, in pair order.
pub type ScanTargets = BTreeMap<String, SideFilter>;

pub async fn fetch_active_pairs(client: &Client, margin_currency: &str) -> Result<Vec<String>, FetchError> {
    let response = client
        .get(ACTIVE_INSTRUMENTS_URL)
        .query(&[("margin_currency_short_name[]", margin_currency)])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { status });
    }
    let body: Value = response.json().await.map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(normalize_instruments(&body))
}

/// Accepts a list of pair strings or of objects carrying `pair` / `symbol`.
/// Blank and repeated names are dropped, first occurrence wins.
pub fn normalize_instruments(body: &Value) -> Vec<String> {
    let Some(items) = body.as_array() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj
                .get("pair")
                .or_else(|| obj.get("symbol"))
                .and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| seen.insert(pair.to_string()))
        .map(String::from)
        .collect()
}

/// 24h price change in percent, `None` when the exchange has no figure.
pub async fn fetch_daily_change(client: &Client, pair: &str) -> Result<Option<f64>, FetchError> {
    let response = client.get(STATS_URL).query(&[("pair", pair)]).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { status });
    }
    let body: Value = response.json().await.map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(parse_daily_change(&body))
}

pub fn parse_daily_change(body: &Value) -> Option<f64> {
    let raw = body.get("price_change_percent")?.get("1D")?;
    let change = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    change.is_finite().then_some(change)
}

/// Splits ranked changes into BUY (gainers) and SELL (losers) targets.
pub fn rank_movers(changes: &[(String, f64)], skip: usize, take: usize) -> ScanTargets {
    let mut ranked = changes.to_vec();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut targets = ScanTargets::new();
    for (pair, _) in ranked.iter().skip(skip).take(take) {
        let entry = targets.entry(pair.clone()).or_insert(SideFilter { buy: false, sell: false });
        *entry = entry.union(SideFilter::only(Side::Buy));
    }
    for (pair, _) in ranked.iter().rev().skip(skip).take(take) {
        let entry = targets.entry(pair.clone()).or_insert(SideFilter { buy: false, sell: false });
        *entry = entry.union(SideFilter::only(Side::Sell));
    }
    targets
}

/// Resolves a universe into scan targets.
pub async fn resolve_universe(
    client: &Client,
    universe: &Universe,
    margin_currency: &str,
    max_workers: usize,
) -> anyhow::Result<ScanTargets> {
    let pairs = match universe {
        Universe::Fixed { pairs } => {
            return Ok(pairs.iter().map(|p| (p.clone(), SideFilter::BOTH)).collect());
        }
        Universe::Active | Universe::TopMovers { .. } => fetch_active_pairs(client, margin_currency).await?,
    };

    let Universe::TopMovers { skip, take } = *universe else {
        return Ok(pairs.into_iter().map(|p| (p, SideFilter::BOTH)).collect());
    };

    let changes: Vec<(String, f64)> = stream::iter(pairs)
        .map(|pair| async move {
            match fetch_daily_change(client, &pair).await {
                Ok(change) => change.map(|c| (pair, c)),
                Err(e) => {
                    log::warn!("{pair}: stats unavailable: {e}");
                    None
                }
            }
        })
        .buffer_unordered(max_workers.max(1))
        .filter_map(|x| async move { x })
        .collect()
        .await;

    log::info!("ranked {} pairs by 24h change", changes.len());
    Ok(rank_movers(&changes, skip, take))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instruments_in_either_shape() {
        let strings = json!(["B-BTC_USDT", "B-ETH_USDT", "B-BTC_USDT", " "]);
        assert_eq!(normalize_instruments(&strings), vec!["B-BTC_USDT", "B-ETH_USDT"]);

        let objects = json!([{"pair": "B-SOL_USDT"}, {"symbol": "B-XRP_USDT"}, {"other": 1}]);
        assert_eq!(normalize_instruments(&objects), vec!["B-SOL_USDT", "B-XRP_USDT"]);

        assert!(normalize_instruments(&json!({"error": "x"})).is_empty());
    }

    #[test]
    fn daily_change_shapes() {
        assert_eq!(parse_daily_change(&json!({"price_change_percent": {"1D": 3.5}})), Some(3.5));
        assert_eq!(parse_daily_change(&json!({"price_change_percent": {"1D": "-2.25"}})), Some(-2.25));
        assert_eq!(parse_daily_change(&json!({"price_change_percent": {}})), None);
        assert_eq!(parse_daily_change(&json!([])), None);
    }

    #[test]
    fn movers_split_by_side() {
        let changes: Vec<(String, f64)> = [("A", 10.0), ("B", 5.0), ("C", 0.0), ("D", -4.0), ("E", -8.0)]
            .iter()
            .map(|(p, c)| (p.to_string(), *c))
            .collect();
        let targets = rank_movers(&changes, 0, 2);
        assert_eq!(targets["A"], SideFilter::only(Side::Buy));
        assert_eq!(targets["B"], SideFilter::only(Side::Buy));
        assert_eq!(targets["E"], SideFilter::only(Side::Sell));
        assert_eq!(targets["D"], SideFilter::only(Side::Sell));
        assert!(!targets.contains_key("C"));

        let skipped = rank_movers(&changes, 1, 1);
        assert_eq!(skipped.keys().collect::<Vec<_>>(), vec!["B", "D"]);
    }
}
