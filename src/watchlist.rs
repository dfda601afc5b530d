//! Two-stage watchlist state machine.
//!
//! Each (pair, side) is either absent or watched. A stage-1 hit puts a pair
//! on the watchlist of that side; a later stage-2 hit on the same side turns
//! it into an alert and takes it off again. Single-stage scanners skip the
//! watchlist and alert straight from the confirmation rule, de-duplicated
//! per bar through [`SignalMemory`].
//!
//! All transitions happen in [`apply_cycle`], which runs on the orchestrating
//! task after every fetch of the cycle has finished.

use crate::risk::{RiskParams, TradePlan, plan_trade};
use crate::rules::{EntryPrice, Evaluation, Hits, Side, Zone};
use crate::storage_utils::{AsyncStorageManager, ScannerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WatchEntry {
    pub pair: String,
    pub side: Side,
    /// Time of the bar the entry rule fired on.
    pub created_at: i64,
    #[serde(default)]
    pub touch_high: Option<f64>,
    #[serde(default)]
    pub touch_low: Option<f64>,
    #[serde(default)]
    pub touch_close: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl WatchEntry {
    fn legacy(pair: String, side: Side) -> Self {
        Self {
            pair,
            side,
            created_at: 0,
            touch_high: None,
            touch_low: None,
            touch_close: None,
            value: None,
        }
    }
}

/// On-disk watchlist row: older files hold bare pair names, and object rows
/// may omit everything but the pair.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum StoredEntry {
    Pair(String),
    Entry(StoredRow),
}

#[derive(Deserialize, Debug, Clone)]
pub struct StoredRow {
    pub pair: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub touch_high: Option<f64>,
    #[serde(default)]
    pub touch_low: Option<f64>,
    #[serde(default)]
    pub touch_close: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl StoredEntry {
    /// The file a row came from decides its side.
    fn into_entry(self, side: Side) -> WatchEntry {
        match self {
            StoredEntry::Pair(pair) => WatchEntry::legacy(pair, side),
            StoredEntry::Entry(row) => WatchEntry {
                pair: row.pair,
                side,
                created_at: row.created_at,
                touch_high: row.touch_high,
                touch_low: row.touch_low,
                touch_close: row.touch_close,
                value: row.value,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistStore {
    pub buy: BTreeMap<String, WatchEntry>,
    pub sell: BTreeMap<String, WatchEntry>,
}

impl WatchlistStore {
    /// Builds the store from the two persisted lists. A pair found on both
    /// sides is dropped from both.
    pub fn from_lists(buy: Vec<StoredEntry>, sell: Vec<StoredEntry>) -> Self {
        let collect = |rows: Vec<StoredEntry>, side: Side| -> BTreeMap<String, WatchEntry> {
            rows.into_iter()
                .map(|row| row.into_entry(side))
                .map(|entry| (entry.pair.clone(), entry))
                .collect()
        };
        let mut buy = collect(buy, Side::Buy);
        let mut sell = collect(sell, Side::Sell);

        let conflicts: Vec<String> = buy.keys().filter(|p| sell.contains_key(*p)).cloned().collect();
        for pair in conflicts {
            log::warn!("{pair} is on both watchlists, dropping it from both");
            buy.remove(&pair);
            sell.remove(&pair);
        }
        Self { buy, sell }
    }

    pub fn to_lists(&self) -> (Vec<WatchEntry>, Vec<WatchEntry>) {
        (self.buy.values().cloned().collect(), self.sell.values().cloned().collect())
    }

    fn side_map(&self, side: Side) -> &BTreeMap<String, WatchEntry> {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<String, WatchEntry> {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    pub fn get(&self, side: Side, pair: &str) -> Option<&WatchEntry> {
        self.side_map(side).get(pair)
    }

    fn get_mut(&mut self, side: Side, pair: &str) -> Option<&mut WatchEntry> {
        self.side_map_mut(side).get_mut(pair)
    }

    /// Side a pair is currently watched on, if any.
    pub fn side_of(&self, pair: &str) -> Option<Side> {
        Side::BOTH.into_iter().find(|&side| self.side_map(side).contains_key(pair))
    }

    /// Adds an entry unless the pair is already watched on either side.
    pub fn insert(&mut self, entry: WatchEntry) -> bool {
        if self.side_of(&entry.pair).is_some() {
            return false;
        }
        self.side_map_mut(entry.side).insert(entry.pair.clone(), entry);
        true
    }

    pub fn remove(&mut self, side: Side, pair: &str) -> Option<WatchEntry> {
        self.side_map_mut(side).remove(pair)
    }

    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn load(storage: &AsyncStorageManager, scanner: &str) -> Self {
        let buy: Vec<StoredEntry> = storage.load_or_default(&format!("{scanner}_BuyWatchlist")).await;
        let sell: Vec<StoredEntry> = storage.load_or_default(&format!("{scanner}_SellWatchlist")).await;
        Self::from_lists(buy, sell)
    }

    pub async fn save(&self, storage: &AsyncStorageManager, scanner: &str) -> anyhow::Result<()> {
        let (buy, sell) = self.to_lists();
        storage.save(&format!("{scanner}_BuyWatchlist"), &buy).await?;
        storage.save(&format!("{scanner}_SellWatchlist"), &sell).await?;
        Ok(())
    }
}

/// What a scanner remembers between runs besides its watchlists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SignalMemory {
    /// `"SIDE:pair"` to the bar time of the last alert.
    #[serde(default)]
    pub last_alert: BTreeMap<String, i64>,
    /// Last RSI zone per pair for zone-latch rules.
    #[serde(default)]
    pub zones: BTreeMap<String, Zone>,
}

impl SignalMemory {
    fn key(side: Side, pair: &str) -> String {
        format!("{}:{pair}", side.label())
    }

    pub fn alerted(&self, side: Side, pair: &str, bar_time: i64) -> bool {
        self.last_alert.get(&Self::key(side, pair)) == Some(&bar_time)
    }

    pub fn record(&mut self, side: Side, pair: &str, bar_time: i64) {
        self.last_alert.insert(Self::key(side, pair), bar_time);
    }

    pub async fn load(storage: &AsyncStorageManager, scanner: &str) -> Self {
        storage.load_or_default(&format!("{scanner}_SignalMemory")).await
    }

    pub async fn save(&self, storage: &AsyncStorageManager, scanner: &str) -> anyhow::Result<()> {
        storage.save(&format!("{scanner}_SignalMemory"), self).await
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Alert {
    pub scanner: String,
    pub pair: String,
    pub side: Side,
    pub bar_time: i64,
    pub close: f64,
    /// Indicator value the confirmation fired on.
    pub value: f64,
    pub reason: String,
    pub plan: Option<TradePlan>,
}

/// Per-scanner knobs of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub scanner: String,
    pub two_stage: bool,
    pub invalidate_on_opposite: bool,
    pub expire_after_ms: Option<i64>,
    pub entry_price: EntryPrice,
    pub risk: Option<RiskParams>,
    pub reason: String,
}

impl Policy {
    pub fn from_scanner(scanner: &ScannerConfig) -> Self {
        let bar_ms = scanner.candles.resolution_minutes as i64 * 60_000;
        let reason = match &scanner.entry {
            Some(entry) => format!("{entry}, then {}", scanner.confirm),
            None => scanner.confirm.to_string(),
        };
        Self {
            scanner: scanner.name.clone(),
            two_stage: scanner.entry.is_some(),
            invalidate_on_opposite: scanner.invalidate_on_opposite,
            expire_after_ms: scanner.expire_after_bars.map(|bars| bars as i64 * bar_ms),
            entry_price: scanner.entry_price,
            risk: scanner.risk.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Confirmed,
    Invalidated,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub pair: String,
    pub side: Side,
    pub reason: RemovalReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub alerts: Vec<Alert>,
    pub added: Vec<WatchEntry>,
    pub removed: Vec<Removal>,
}

/// Applies one cycle of evaluations to the store and memory.
///
/// Evaluations are handled in pair order and each pair at most once, so the
/// outcome does not depend on the order fetches completed in.
pub fn apply_cycle(
    store: &mut WatchlistStore,
    memory: &mut SignalMemory,
    evaluations: &[Evaluation],
    policy: &Policy,
) -> CycleOutcome {
    let mut ordered: Vec<&Evaluation> = evaluations.iter().collect();
    ordered.sort_by(|a, b| a.pair.cmp(&b.pair));
    ordered.dedup_by(|a, b| a.pair == b.pair);

    let mut outcome = CycleOutcome::default();
    for ev in ordered {
        let confirm = latched_confirm(ev, memory);
        if policy.two_stage {
            step_two_stage(store, ev, confirm, policy, &mut outcome);
        } else {
            step_single_stage(memory, ev, confirm, policy, &mut outcome);
        }
    }
    outcome
}

/// Confirmation hits with the zone latch folded in. Updates the stored zone.
fn latched_confirm(ev: &Evaluation, memory: &mut SignalMemory) -> Hits {
    let mut confirm = ev.confirm;
    if let Some(reading) = ev.zone {
        let previous = memory.zones.get(&ev.pair).copied().unwrap_or_default();
        if reading.zone != Zone::Neutral && reading.zone != previous {
            if let Some(side) = reading.side {
                confirm.set(side, reading.value);
            }
        }
        memory.zones.insert(ev.pair.clone(), reading.zone);
    }
    confirm
}

fn step_two_stage(
    store: &mut WatchlistStore,
    ev: &Evaluation,
    confirm: Hits,
    policy: &Policy,
    outcome: &mut CycleOutcome,
) {
    let t = ev.bar.time;

    if let Some(side) = store.side_of(&ev.pair) {
        let Some(entry) = store.get(side, &ev.pair).cloned() else {
            return;
        };
        if t <= entry.created_at {
            return;
        }
        // rows from bare pair lists carry no touch time; they start ageing now
        let unstamped = entry.created_at == 0;

        let reason = if let Some(value) = confirm.get(side) {
            let stop = match side {
                Side::Buy => entry.touch_low.unwrap_or(ev.bar.low),
                Side::Sell => entry.touch_high.unwrap_or(ev.bar.high),
            };
            outcome.alerts.push(build_alert(ev, side, value, stop, policy));
            RemovalReason::Confirmed
        } else if policy.invalidate_on_opposite && ev.entry.get(side.opposite()).is_some() {
            RemovalReason::Invalidated
        } else if !unstamped && policy.expire_after_ms.is_some_and(|ms| t - entry.created_at >= ms) {
            RemovalReason::Expired
        } else {
            if unstamped {
                if let Some(watched) = store.get_mut(side, &ev.pair) {
                    watched.created_at = t;
                }
            }
            return;
        };

        store.remove(side, &ev.pair);
        log::debug!("{}: {} removed from {} watchlist ({reason:?})", policy.scanner, ev.pair, side.label());
        outcome.removed.push(Removal { pair: ev.pair.clone(), side, reason });
        return;
    }

    let side = match (ev.entry.buy, ev.entry.sell) {
        (Some(_), None) => Side::Buy,
        (None, Some(_)) => Side::Sell,
        (Some(_), Some(_)) => {
            log::info!("{}: {} touched both sides on one bar, skipped", policy.scanner, ev.pair);
            return;
        }
        (None, None) => return,
    };

    let entry = WatchEntry {
        pair: ev.pair.clone(),
        side,
        created_at: t,
        touch_high: Some(ev.bar.high),
        touch_low: Some(ev.bar.low),
        touch_close: Some(ev.bar.close),
        value: ev.entry.get(side),
    };
    if store.insert(entry.clone()) {
        log::debug!("{}: {} added to {} watchlist", policy.scanner, ev.pair, side.label());
        outcome.added.push(entry);
    }
}

fn step_single_stage(
    memory: &mut SignalMemory,
    ev: &Evaluation,
    confirm: Hits,
    policy: &Policy,
    outcome: &mut CycleOutcome,
) {
    let t = ev.bar.time;
    for side in Side::BOTH {
        let Some(value) = confirm.get(side) else {
            continue;
        };
        if memory.alerted(side, &ev.pair, t) {
            continue;
        }
        memory.record(side, &ev.pair, t);
        let stop = match side {
            Side::Buy => ev.bar.low,
            Side::Sell => ev.bar.high,
        };
        outcome.alerts.push(build_alert(ev, side, value, stop, policy));
    }
}

fn build_alert(ev: &Evaluation, side: Side, value: f64, stop: f64, policy: &Policy) -> Alert {
    let entry = policy.entry_price.price(&ev.bar, side);
    Alert {
        scanner: policy.scanner.clone(),
        pair: ev.pair.clone(),
        side,
        bar_time: ev.bar.time,
        close: ev.bar.close,
        value,
        reason: policy.reason.clone(),
        plan: policy.risk.as_ref().and_then(|risk| plan_trade(side, entry, stop, risk)),
    }
}
