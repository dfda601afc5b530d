//! Candle downloads.
//!
//! Both sources end up as a sorted, de-duplicated `Vec<PriceBar>`. An empty
//! or malformed payload is "no data" (`Ok(None)`); transport problems are a
//! [`FetchError`] so the caller can log what went wrong and move on.

use crate::candle::{PriceBar, parse_candles};
use crate::storage_utils::KlineConfig;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

const COINDCX_CANDLES_URL: &str = "https://public.coindcx.com/market_data/candlesticks";
const BINANCE_KLINES_URL: &str = "https://fapi.binance.com/fapi/v1/klines";

// Binance returns positional arrays; these name the columns.
const KLINE_KEYS: &[&str] = &[
    "openTime",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "closeTime",
    "quoteAssetVolume",
    "numberOfTrades",
    "takerBuyBaseAssetVolume",
    "takerBuyQuoteAssetVolume",
    "ignore",
];

static BAN_UNTIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"until\s+(\d+)").expect("valid regex"));
static COINDCX_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^B-([A-Z0-9]+)_([A-Z0-9]+)$").expect("valid regex"));

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandleSource {
    #[default]
    CoinDcx,
    Binance,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}")]
    Status { status: StatusCode },
    #[error("rate limited until {until:?}")]
    RateLimited { until: Option<u64> },
    #[error("unexpected payload: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct CoinDcxCandles {
    #[serde(default)]
    data: Vec<Value>,
}

/// Fetches the candles of one pair ending at `now_ms`.
pub async fn fetch_candles(
    client: &Client,
    config: &KlineConfig,
    pair: &str,
    now_ms: i64,
) -> Result<Option<Vec<PriceBar>>, FetchError> {
    let bars = match config.source {
        CandleSource::CoinDcx => fetch_coindcx(client, config, pair, now_ms).await?,
        CandleSource::Binance => fetch_binance(client, config, pair).await?,
    };
    if bars.len() < config.min_bars.max(2) {
        log::debug!("{pair}: only {} candles, skipping", bars.len());
        return Ok(None);
    }
    Ok(Some(bars))
}

async fn fetch_coindcx(
    client: &Client,
    config: &KlineConfig,
    pair: &str,
    now_ms: i64,
) -> Result<Vec<PriceBar>, FetchError> {
    let to = now_ms / 1000;
    let from = to - config.lookback_bars as i64 * config.resolution_minutes as i64 * 60;
    let query = [
        ("pair", pair.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
        ("resolution", coindcx_resolution(config.resolution_minutes)),
        ("pcode", "f".to_string()),
    ];

    let response = client.get(COINDCX_CANDLES_URL).query(&query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { status });
    }
    let body: CoinDcxCandles = response
        .json()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(parse_candles(&body.data))
}

async fn fetch_binance(client: &Client, config: &KlineConfig, pair: &str) -> Result<Vec<PriceBar>, FetchError> {
    let symbol = binance_symbol(pair);
    let query = [
        ("symbol", symbol),
        ("interval", binance_interval(config.resolution_minutes)),
        ("limit", config.lookback_bars.clamp(1, 1500).to_string()),
    ];

    let response = client.get(BINANCE_KLINES_URL).query(&query).send().await?;
    let status = response.status();

    if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
        let text = response.text().await.unwrap_or_default();
        return Err(FetchError::RateLimited { until: ban_until(&text) });
    }
    if !status.is_success() {
        return Err(FetchError::Status { status });
    }

    let raw_klines: Vec<Vec<Value>> = response
        .json()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(parse_candles(&kline_rows(raw_klines)))
}

/// Turns positional kline arrays into objects keyed by column name.
fn kline_rows(raw: Vec<Vec<Value>>) -> Vec<Value> {
    raw.into_iter()
        .map(|k| {
            let row: Map<String, Value> = KLINE_KEYS
                .iter()
                .zip(k)
                .map(|(&key, val)| (key.to_string(), val))
                .collect();
            Value::Object(row)
        })
        .collect()
}

/// Ban expiry (ms) from a Binance 418/429 body.
pub fn ban_until(body: &str) -> Option<u64> {
    BAN_UNTIL
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `B-BTC_USDT` -> `BTCUSDT`. Anything else passes through without the
/// separators.
pub fn binance_symbol(pair: &str) -> String {
    match COINDCX_PAIR.captures(pair) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => pair.replace(['-', '_'], ""),
    }
}

fn coindcx_resolution(minutes: u32) -> String {
    match minutes {
        1440 => "1D".to_string(),
        m => m.to_string(),
    }
}

fn binance_interval(minutes: u32) -> String {
    match minutes {
        m if m >= 1440 && m % 1440 == 0 => format!("{}d", m / 1440),
        m if m >= 60 && m % 60 == 0 => format!("{}h", m / 60),
        m => format!("{m}m"),
    }
}
