//! One poll cycle: for every enabled scanner resolve the universe, download
//! candles in parallel, evaluate the rules and move the watchlists.

use crate::alert::{TelegramNotifier, format_message};
use crate::candle::PriceBar;
use crate::find_tickers::{ScanTargets, resolve_universe};
use crate::klines::{FetchError, fetch_candles};
use crate::rules::{Evaluation, SideFilter, evaluate_pair};
use crate::storage_utils::{AppConfig, AsyncStorageManager, HttpConfig, ScannerConfig};
use crate::watchlist::{CycleOutcome, Policy, SignalMemory, WatchlistStore, apply_cycle};
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::{Duration, Instant};

/// Summary of one scanner's cycle, rendered by the report table.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scanner: String,
    pub title: String,
    pub scanned: usize,
    pub with_data: usize,
    pub failed: usize,
    pub outcome: CycleOutcome,
    pub watching_buy: usize,
    pub watching_sell: usize,
    pub elapsed: Duration,
}

pub fn build_client(http: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs.max(1)))
        .pool_max_idle_per_host(http.max_workers.max(1))
        .build()?;
    Ok(client)
}

/// Runs every enabled scanner once. A failing scanner is logged and skipped.
pub async fn run_cycle(
    client: &Client,
    config: &AppConfig,
    storage: &AsyncStorageManager,
    notifier: &TelegramNotifier,
) -> Vec<ScanReport> {
    let mut reports = Vec::new();
    for scanner in config.scanners.iter().filter(|s| s.enabled) {
        match run_scanner(client, config, scanner, storage, notifier).await {
            Ok(report) => reports.push(report),
            Err(e) => log::error!("scanner {} failed: {e:#}", scanner.name),
        }
    }
    reports
}

pub async fn run_scanner(
    client: &Client,
    config: &AppConfig,
    scanner: &ScannerConfig,
    storage: &AsyncStorageManager,
    notifier: &TelegramNotifier,
) -> Result<ScanReport> {
    let started = Instant::now();
    let mut store = WatchlistStore::load(storage, &scanner.name).await;
    let mut memory = SignalMemory::load(storage, &scanner.name).await;

    let mut targets = resolve_universe(
        client,
        &scanner.universe,
        &config.margin_currency,
        config.http.max_workers,
    )
    .await?;
    include_watched(&mut targets, &store);
    log::info!("{}: scanning {} pairs", scanner.name, targets.len());

    let scanned = targets.len();
    let now_ms = Utc::now().timestamp_millis();
    let fetched = fetch_all(client, scanner, targets, config.http.max_workers, now_ms).await;

    let mut failed = 0;
    let mut series = Vec::with_capacity(fetched.len());
    for (pair, sides, result) in fetched {
        match result {
            Ok(Some(bars)) => series.push((pair, sides, bars)),
            Ok(None) => {}
            Err(FetchError::RateLimited { until }) => {
                failed += 1;
                log::warn!("{pair}: rate limited (until {until:?})");
            }
            Err(e) => {
                failed += 1;
                log::warn!("{pair}: {e}");
            }
        }
    }

    let evaluations = evaluate_all(scanner, &series);
    let policy = Policy::from_scanner(scanner);
    let outcome = apply_cycle(&mut store, &mut memory, &evaluations, &policy);

    store.save(storage, &scanner.name).await?;
    memory.save(storage, &scanner.name).await?;

    log::info!(
        "{}: {} alerts, {} added, {} removed, watching {} buy / {} sell",
        scanner.name,
        outcome.alerts.len(),
        outcome.added.len(),
        outcome.removed.len(),
        store.buy.len(),
        store.sell.len()
    );

    if let Some(text) = format_message(scanner.display_title(), &outcome.alerts, scanned, Utc::now()) {
        notifier.send(&text).await;
    }

    Ok(ScanReport {
        scanner: scanner.name.clone(),
        title: scanner.display_title().to_string(),
        scanned,
        with_data: series.len(),
        failed,
        outcome,
        watching_buy: store.buy.len(),
        watching_sell: store.sell.len(),
        elapsed: started.elapsed(),
    })
}

/// Watched pairs are always re-evaluated with both sides open, so they can
/// confirm, invalidate or expire whatever side the universe now puts them on.
fn include_watched(targets: &mut ScanTargets, store: &WatchlistStore) {
    for pair in store.buy.keys().chain(store.sell.keys()) {
        targets.insert(pair.clone(), SideFilter::BOTH);
    }
}

type Fetched = (String, SideFilter, Result<Option<Vec<PriceBar>>, FetchError>);

/// Bounded parallel download. Results arrive in completion order.
async fn fetch_all(
    client: &Client,
    scanner: &ScannerConfig,
    targets: ScanTargets,
    max_workers: usize,
    now_ms: i64,
) -> Vec<Fetched> {
    stream::iter(targets)
        .map(|(pair, sides)| async move {
            let result = fetch_candles(client, &scanner.candles, &pair, now_ms).await;
            (pair, sides, result)
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await
}

/// Runs the scanner's rules over already-downloaded series.
pub fn evaluate_all(scanner: &ScannerConfig, series: &[(String, SideFilter, Vec<PriceBar>)]) -> Vec<Evaluation> {
    series
        .iter()
        .filter_map(|(pair, sides, bars)| {
            evaluate_pair(pair, bars, scanner.source, scanner.entry.as_ref(), &scanner.confirm, *sides)
        })
        .collect()
}
