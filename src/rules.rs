//! Declarative signal rules.
//!
//! A scanner is a stage-1 entry rule (touch / extreme, optional) plus a
//! stage-2 confirmation rule. Both are evaluated on the most recent closed
//! bar of a pair and report, per side, whether they fired together with the
//! indicator value they fired on.

use crate::candle::{PriceBar, closed_bars, column};
use crate::indicators::{
    self, StdMode, Trend, crossed_above, crossed_above_level, crossed_below, crossed_below_level,
    value_at,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Buy, Side::Sell];

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Per-side outcome of a rule: `Some(value)` when it fired.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Hits {
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

impl Hits {
    pub fn get(&self, side: Side) -> Option<f64> {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }

    pub fn set(&mut self, side: Side, value: f64) {
        match side {
            Side::Buy => self.buy = Some(value),
            Side::Sell => self.sell = Some(value),
        }
    }

    /// Drops the sides a pair is not scanned for.
    pub fn restrict(self, allowed: SideFilter) -> Hits {
        Hits {
            buy: self.buy.filter(|_| allowed.buy),
            sell: self.sell.filter(|_| allowed.sell),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_none() && self.sell.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideFilter {
    pub buy: bool,
    pub sell: bool,
}

impl SideFilter {
    pub const BOTH: SideFilter = SideFilter { buy: true, sell: true };

    pub fn only(side: Side) -> SideFilter {
        SideFilter {
            buy: side == Side::Buy,
            sell: side == Side::Sell,
        }
    }

    pub fn union(self, other: SideFilter) -> SideFilter {
        SideFilter {
            buy: self.buy || other.buy,
            sell: self.sell || other.sell,
        }
    }
}

/// Which bars the rules look at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    #[default]
    Raw,
    /// Heikin-Ashi candles, indicators included.
    HeikinAshi,
    /// Heikin-Ashi candles tested against indicators of the raw bars.
    HeikinAshiCandles,
}

/// Price a confirmed trade is entered at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryPrice {
    #[default]
    Close,
    /// High of the confirmation bar for BUY, low for SELL.
    Breakout,
}

impl EntryPrice {
    pub fn price(self, bar: &PriceBar, side: Side) -> f64 {
        match (self, side) {
            (EntryPrice::Close, _) => bar.close,
            (EntryPrice::Breakout, Side::Buy) => bar.high,
            (EntryPrice::Breakout, Side::Sell) => bar.low,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TouchPrice {
    /// Low against the lower band, high against the upper band.
    #[default]
    Wick,
    Close,
}

// --- Stage 1 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryRule {
    BollingerTouch {
        period: usize,
        k: f64,
        #[serde(default)]
        std_mode: StdMode,
        #[serde(default)]
        touch: TouchPrice,
    },
    RsiExtreme {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
    CciExtreme {
        period: usize,
        lower: f64,
        upper: f64,
    },
    WilliamsExtreme {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
}

impl EntryRule {
    /// Evaluates the rule on the last bar of `bars`.
    pub fn evaluate(&self, bars: &[PriceBar]) -> Hits {
        self.evaluate_on(bars, bars)
    }

    /// Tests the last bar of `candles` against indicators computed on `basis`.
    /// Both series cover the same bars.
    pub fn evaluate_on(&self, candles: &[PriceBar], basis: &[PriceBar]) -> Hits {
        let mut hits = Hits::default();
        let Some(i) = candles.len().checked_sub(1) else {
            return hits;
        };
        let bar = &candles[i];

        match *self {
            EntryRule::BollingerTouch { period, k, std_mode, touch } => {
                let bands = indicators::bollinger(&column(basis, |b| b.close), period, k, std_mode);
                let (low, high) = match touch {
                    TouchPrice::Wick => (bar.low, bar.high),
                    TouchPrice::Close => (bar.close, bar.close),
                };
                if let Some(lower) = value_at(&bands.lower, i) {
                    if low <= lower {
                        hits.set(Side::Buy, lower);
                    }
                }
                if let Some(upper) = value_at(&bands.upper, i) {
                    if high >= upper {
                        hits.set(Side::Sell, upper);
                    }
                }
            }
            EntryRule::RsiExtreme { period, oversold, overbought } => {
                if let Some(rsi) = value_at(&indicators::rsi(&column(basis, |b| b.close), period), i) {
                    extremes(&mut hits, rsi, oversold, overbought);
                }
            }
            EntryRule::CciExtreme { period, lower, upper } => {
                if let Some(cci) = value_at(&indicators::cci(basis, period), i) {
                    extremes(&mut hits, cci, lower, upper);
                }
            }
            EntryRule::WilliamsExtreme { period, oversold, overbought } => {
                if let Some(wr) = value_at(&indicators::williams_r(basis, period), i) {
                    extremes(&mut hits, wr, oversold, overbought);
                }
            }
        }
        hits
    }
}

fn extremes(hits: &mut Hits, value: f64, low: f64, high: f64) {
    if value <= low {
        hits.set(Side::Buy, value);
    }
    if value >= high {
        hits.set(Side::Sell, value);
    }
}

// --- Stage 2 ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RsiGate {
    pub period: usize,
    pub level: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmRule {
    /// Green bar confirms BUY, red bar confirms SELL.
    CandleColor,
    RsiLevel {
        period: usize,
        level: f64,
    },
    /// The whole bar outside the band: low above upper (BUY), high below
    /// lower (SELL).
    BandBreakout {
        period: usize,
        k: f64,
        #[serde(default)]
        std_mode: StdMode,
    },
    MacdCross {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    SupertrendFlip {
        period: usize,
        multiplier: f64,
        #[serde(default)]
        rsi: Option<RsiGate>,
    },
    /// BUY when CCI crosses above `level`, SELL when it crosses below `-level`.
    CciCross {
        period: usize,
        level: f64,
        /// Bars before the cross that must have stayed on the near side.
        #[serde(default)]
        quiet_bars: Option<usize>,
    },
    EmaCross {
        fast: usize,
        slow: usize,
        /// Slow EMA must sit above (BUY) / below (SELL) this EMA.
        #[serde(default)]
        trend: Option<usize>,
    },
    StochasticCross {
        period: usize,
        k_smooth: usize,
        d_smooth: usize,
        oversold: f64,
        overbought: f64,
    },
    /// Fires once when RSI enters an extreme zone; re-arms in the neutral band.
    RsiZone {
        period: usize,
        lower: f64,
        upper: f64,
        #[serde(default = "default_true")]
        follow_momentum: bool,
    },
    AdxTrend {
        period: usize,
        threshold: f64,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    #[default]
    Neutral,
    Overbought,
    Oversold,
}

/// Current RSI zone and the side an entry into it signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneReading {
    pub zone: Zone,
    pub side: Option<Side>,
    pub value: f64,
}

impl ConfirmRule {
    /// Evaluates the rule on the last bar of `bars` (and the one before it for
    /// crossings).
    pub fn evaluate(&self, bars: &[PriceBar]) -> Hits {
        self.evaluate_on(bars, bars)
    }

    /// Candle tests use `candles`, indicators are computed on `basis`.
    pub fn evaluate_on(&self, candles: &[PriceBar], basis: &[PriceBar]) -> Hits {
        let mut hits = Hits::default();
        let Some(i) = candles.len().checked_sub(1) else {
            return hits;
        };
        let bar = &candles[i];
        let closes = column(basis, |b| b.close);

        match *self {
            ConfirmRule::CandleColor => {
                if bar.is_green() {
                    hits.set(Side::Buy, bar.close);
                } else if bar.is_red() {
                    hits.set(Side::Sell, bar.close);
                }
            }
            ConfirmRule::RsiLevel { period, level } => {
                if let Some(rsi) = value_at(&indicators::rsi(&closes, period), i) {
                    if rsi > level {
                        hits.set(Side::Buy, rsi);
                    } else if rsi < level {
                        hits.set(Side::Sell, rsi);
                    }
                }
            }
            ConfirmRule::BandBreakout { period, k, std_mode } => {
                let bands = indicators::bollinger(&closes, period, k, std_mode);
                if let (Some(lower), Some(upper)) = (value_at(&bands.lower, i), value_at(&bands.upper, i)) {
                    if bar.low > upper {
                        hits.set(Side::Buy, upper);
                    } else if bar.high < lower {
                        hits.set(Side::Sell, lower);
                    }
                }
            }
            ConfirmRule::MacdCross { fast, slow, signal } => {
                let m = indicators::macd(&closes, fast, slow, signal);
                if let Some(value) = value_at(&m.macd, i) {
                    if crossed_above(&m.macd, &m.signal, i) {
                        hits.set(Side::Buy, value);
                    } else if crossed_below(&m.macd, &m.signal, i) {
                        hits.set(Side::Sell, value);
                    }
                }
            }
            ConfirmRule::SupertrendFlip { period, multiplier, rsi } => {
                let st = indicators::supertrend(basis, period, multiplier);
                let previous = i.checked_sub(1).and_then(|p| st.trend[p]);
                let flipped = match st.trend[i] {
                    Some(trend) if previous != Some(trend) => Some(trend),
                    _ => None,
                };
                let gate = rsi.map(|g| {
                    (value_at(&indicators::rsi(&closes, g.period), i), g.level)
                });
                if let (Some(trend), Some(line)) = (flipped, value_at(&st.line, i)) {
                    let side = match trend {
                        Trend::Up => Side::Buy,
                        Trend::Down => Side::Sell,
                    };
                    let passes = match gate {
                        None => true,
                        Some((Some(value), level)) => match side {
                            Side::Buy => value > level,
                            Side::Sell => value < level,
                        },
                        Some((None, _)) => false,
                    };
                    if passes {
                        hits.set(side, line);
                    }
                }
            }
            ConfirmRule::CciCross { period, level, quiet_bars } => {
                let series = indicators::cci(basis, period);
                if let Some(value) = value_at(&series, i) {
                    if crossed_above_level(&series, level, i)
                        && stayed(&series, i, quiet_bars, |v| v <= level)
                    {
                        hits.set(Side::Buy, value);
                    } else if crossed_below_level(&series, -level, i)
                        && stayed(&series, i, quiet_bars, |v| v >= -level)
                    {
                        hits.set(Side::Sell, value);
                    }
                }
            }
            ConfirmRule::EmaCross { fast, slow, trend } => {
                let fast_ema = indicators::ema(&closes, fast);
                let slow_ema = indicators::ema(&closes, slow);
                let trend_ema = trend.map(|span| indicators::ema(&closes, span));
                let slow_now = value_at(&slow_ema, i);
                let trend_now = trend_ema.as_ref().map(|t| value_at(t, i));

                if let Some(slow_now) = slow_now {
                    let trend_ok = |side: Side| match trend_now {
                        None => true,
                        Some(Some(t)) => match side {
                            Side::Buy => slow_now > t,
                            Side::Sell => slow_now < t,
                        },
                        Some(None) => false,
                    };
                    if crossed_above(&fast_ema, &slow_ema, i) && trend_ok(Side::Buy) {
                        hits.set(Side::Buy, slow_now);
                    } else if crossed_below(&fast_ema, &slow_ema, i) && trend_ok(Side::Sell) {
                        hits.set(Side::Sell, slow_now);
                    }
                }
            }
            ConfirmRule::StochasticCross { period, k_smooth, d_smooth, oversold, overbought } => {
                let s = indicators::stochastic(basis, period, k_smooth, d_smooth);
                if let (Some(k), Some(d)) = (value_at(&s.k, i), value_at(&s.d, i)) {
                    if crossed_above(&s.k, &s.d, i) && k < oversold && d < oversold {
                        hits.set(Side::Buy, k);
                    } else if crossed_below(&s.k, &s.d, i) && k > overbought && d > overbought {
                        hits.set(Side::Sell, k);
                    }
                }
            }
            // Needs memory of the previous zone; see `zone`.
            ConfirmRule::RsiZone { .. } => {}
            ConfirmRule::AdxTrend { period, threshold } => {
                let a = indicators::adx(basis, period);
                if crossed_above_level(&a.adx, threshold, i) {
                    if let (Some(value), Some(plus), Some(minus)) =
                        (value_at(&a.adx, i), value_at(&a.plus_di, i), value_at(&a.minus_di, i))
                    {
                        if plus > minus {
                            hits.set(Side::Buy, value);
                        } else if minus > plus {
                            hits.set(Side::Sell, value);
                        }
                    }
                }
            }
        }
        hits
    }

    /// Zone of the last bar for zone-latch rules.
    pub fn zone(&self, bars: &[PriceBar]) -> Option<ZoneReading> {
        let ConfirmRule::RsiZone { period, lower, upper, follow_momentum } = *self else {
            return None;
        };
        let i = bars.len().checked_sub(1)?;
        let value = value_at(&indicators::rsi(&column(bars, |b| b.close), period), i)?;

        let (zone, side) = if value > upper {
            let side = if follow_momentum { Side::Buy } else { Side::Sell };
            (Zone::Overbought, Some(side))
        } else if value < lower {
            let side = if follow_momentum { Side::Sell } else { Side::Buy };
            (Zone::Oversold, Some(side))
        } else {
            (Zone::Neutral, None)
        };
        Some(ZoneReading { zone, side, value })
    }
}

/// The `quiet` values before `i` all satisfy `near`. Undefined values fail.
fn stayed(series: &[f64], i: usize, quiet: Option<usize>, near: impl Fn(f64) -> bool) -> bool {
    let Some(quiet) = quiet else {
        return true;
    };
    if quiet > i {
        return false;
    }
    (i - quiet..i).all(|j| value_at(series, j).is_some_and(&near))
}

impl fmt::Display for EntryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRule::BollingerTouch { period, k, .. } => write!(f, "BB({period}, {k}) touch"),
            EntryRule::RsiExtreme { period, .. } => write!(f, "RSI({period}) extreme"),
            EntryRule::CciExtreme { period, .. } => write!(f, "CCI({period}) extreme"),
            EntryRule::WilliamsExtreme { period, .. } => write!(f, "W%R({period}) extreme"),
        }
    }
}

impl fmt::Display for ConfirmRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmRule::CandleColor => write!(f, "candle colour"),
            ConfirmRule::RsiLevel { period, level } => write!(f, "RSI({period}) vs {level}"),
            ConfirmRule::BandBreakout { period, k, .. } => write!(f, "BB({period}, {k}) breakout"),
            ConfirmRule::MacdCross { fast, slow, signal } => write!(f, "MACD({fast}, {slow}, {signal}) cross"),
            ConfirmRule::SupertrendFlip { period, multiplier, rsi: None } => {
                write!(f, "Supertrend({period}, {multiplier}) flip")
            }
            ConfirmRule::SupertrendFlip { period, multiplier, rsi: Some(gate) } => {
                write!(f, "Supertrend({period}, {multiplier}) flip, RSI({}) gate {}", gate.period, gate.level)
            }
            ConfirmRule::CciCross { period, level, .. } => write!(f, "CCI({period}) cross {level}"),
            ConfirmRule::EmaCross { fast, slow, .. } => write!(f, "EMA {fast}/{slow} cross"),
            ConfirmRule::StochasticCross { period, .. } => write!(f, "Stoch({period}) cross"),
            ConfirmRule::RsiZone { period, lower, upper, .. } => {
                write!(f, "RSI({period}) zone {lower}/{upper}")
            }
            ConfirmRule::AdxTrend { period, threshold } => write!(f, "ADX({period}) above {threshold}"),
        }
    }
}

// --- Pair evaluation ---

/// Everything the watchlist state machine needs to know about one pair on
/// its latest closed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub pair: String,
    /// Latest closed bar of the series the rules ran on.
    pub bar: PriceBar,
    pub entry: Hits,
    pub confirm: Hits,
    pub zone: Option<ZoneReading>,
}

/// Drops the live bar, converts to the configured price source and runs both
/// rules. `None` when there is no closed bar at all.
pub fn evaluate_pair(
    pair: &str,
    bars: &[PriceBar],
    source: PriceSource,
    entry: Option<&EntryRule>,
    confirm: &ConfirmRule,
    allowed: SideFilter,
) -> Option<Evaluation> {
    let closed = closed_bars(bars);
    let (candles, raw_basis) = match source {
        PriceSource::Raw => (closed.to_vec(), None),
        PriceSource::HeikinAshi => (indicators::heikin_ashi(closed), None),
        PriceSource::HeikinAshiCandles => (indicators::heikin_ashi(closed), Some(closed)),
    };
    let basis = raw_basis.unwrap_or(candles.as_slice());
    let bar = *candles.last()?;

    let zone = confirm.zone(basis).map(|mut reading| {
        reading.side = reading.side.filter(|side| match side {
            Side::Buy => allowed.buy,
            Side::Sell => allowed.sell,
        });
        reading
    });

    Some(Evaluation {
        pair: pair.to_string(),
        bar,
        entry: entry
            .map(|rule| rule.evaluate_on(&candles, basis).restrict(allowed))
            .unwrap_or_default(),
        confirm: confirm.evaluate_on(&candles, basis).restrict(allowed),
        zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn candle_color() {
        let green = PriceBar { time: 0, open: 10.0, high: 12.0, low: 9.0, close: 11.0, volume: 1.0 };
        let red = PriceBar { close: 9.5, ..green };
        let doji = PriceBar { close: 10.0, ..green };
        assert!(ConfirmRule::CandleColor.evaluate(&[green]).buy.is_some());
        assert!(ConfirmRule::CandleColor.evaluate(&[red]).sell.is_some());
        assert!(ConfirmRule::CandleColor.evaluate(&[doji]).is_empty());
    }

    #[test]
    fn rsi_extreme_on_straight_decline() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let rule = EntryRule::RsiExtreme { period: 14, oversold: 30.0, overbought: 70.0 };
        let hits = rule.evaluate(&make_bars(&closes));
        assert_eq!(hits.buy, Some(0.0));
        assert_eq!(hits.sell, None);
    }

    #[test]
    fn warm_up_gives_no_signal() {
        let rule = EntryRule::BollingerTouch {
            period: 20,
            k: 2.0,
            std_mode: StdMode::Sample,
            touch: TouchPrice::Wick,
        };
        assert!(rule.evaluate(&make_bars(&[100.0, 90.0, 80.0])).is_empty());
        assert!(rule.evaluate(&[]).is_empty());
    }

    #[test]
    fn quiet_window_blocks_repeat_crosses() {
        let series = [50.0, 120.0, 90.0, 130.0];
        assert!(stayed(&series, 1, Some(1), |v| v <= 100.0));
        assert!(!stayed(&series, 3, Some(2), |v| v <= 100.0));
        assert!(!stayed(&series, 1, Some(3), |v| v <= 100.0));
        assert!(stayed(&series, 3, None, |v| v <= 100.0));
    }

    #[test]
    fn zone_reading_maps_momentum() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let momentum = ConfirmRule::RsiZone { period: 14, lower: 30.0, upper: 70.0, follow_momentum: true };
        let reversal = ConfirmRule::RsiZone { period: 14, lower: 30.0, upper: 70.0, follow_momentum: false };
        assert_eq!(momentum.zone(&bars).unwrap().side, Some(Side::Buy));
        assert_eq!(reversal.zone(&bars).unwrap().side, Some(Side::Sell));
        assert_eq!(momentum.zone(&bars).unwrap().zone, Zone::Overbought);
        assert!(ConfirmRule::CandleColor.zone(&bars).is_none());
    }

    #[test]
    fn evaluation_ignores_live_bar() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0]);
        // live bar is red, last closed bar is green
        bars.push(PriceBar { time: 99, open: 12.0, high: 12.5, low: 10.0, close: 10.5, volume: 1.0 });
        let ev = evaluate_pair("B-BTC_USDT", &bars, PriceSource::Raw, None, &ConfirmRule::CandleColor, SideFilter::BOTH)
            .unwrap();
        assert_eq!(ev.bar.close, 12.0);
        assert!(ev.confirm.buy.is_some());
    }

    #[test]
    fn restricted_sides_are_dropped() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 12.0]);
        let ev = evaluate_pair(
            "B-ETH_USDT",
            &bars,
            PriceSource::Raw,
            None,
            &ConfirmRule::CandleColor,
            SideFilter::only(Side::Sell),
        )
        .unwrap();
        assert!(ev.confirm.is_empty());
    }

    fn ohlc(time: i64, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar { time, open, high, low, close, volume: 1.0 }
    }

    /// 40 bars down one unit each, then 20 bars up two units each.
    fn v_shape() -> Vec<PriceBar> {
        let closes: Vec<f64> = (0..40)
            .map(|i| 140.0 - i as f64)
            .chain((1..=20).map(|j| 100.0 + 2.0 * j as f64))
            .collect();
        make_bars(&closes)
    }

    /// 40 bars cycling 100/102/100/98, then a steady climb of two units a bar.
    fn range_then_trend() -> Vec<PriceBar> {
        let cycle = [100.0, 102.0, 100.0, 98.0];
        let closes: Vec<f64> = (0..40)
            .map(|i| cycle[i % 4])
            .chain((1..=30).map(|j| 98.0 + 2.0 * j as f64))
            .collect();
        make_bars(&closes)
    }

    /// Closes alternating 100/102 with a 101 open.
    fn band_range(len: usize) -> Vec<PriceBar> {
        (0..len as i64)
            .map(|i| match i % 2 {
                0 => ohlc(i, 101.0, 101.5, 99.5, 100.0),
                _ => ohlc(i, 101.0, 102.5, 100.5, 102.0),
            })
            .collect()
    }

    /// Walks the series one closed bar at a time and lists every bar the rule
    /// fired on.
    fn signals(rule: &ConfirmRule, bars: &[PriceBar]) -> Vec<(usize, Side)> {
        (1..=bars.len())
            .flat_map(|n| {
                let hits = rule.evaluate(&bars[..n]);
                Side::BOTH
                    .into_iter()
                    .filter(move |&side| hits.get(side).is_some())
                    .map(move |side| (n - 1, side))
            })
            .collect()
    }

    #[test]
    fn rsi_level_follows_the_trend() {
        let rule = ConfirmRule::RsiLevel { period: 14, level: 50.0 };
        let bars = v_shape();
        assert_eq!(rule.evaluate(&bars[..40]).sell, Some(0.0));
        assert!(rule.evaluate(&bars[..40]).buy.is_none());
        assert!(rule.evaluate(&bars).buy.is_some());
        assert!(rule.evaluate(&bars[..14]).is_empty());
    }

    #[test]
    fn macd_crosses_signal_after_the_bottom() {
        let rule = ConfirmRule::MacdCross { fast: 12, slow: 26, signal: 9 };
        assert_eq!(signals(&rule, &v_shape()), vec![(1, Side::Sell), (41, Side::Buy)]);
    }

    #[test]
    fn supertrend_flip_fires_on_the_flip_bar_only() {
        let rule = ConfirmRule::SupertrendFlip { period: 10, multiplier: 3.0, rsi: None };
        let bars = v_shape();
        assert_eq!(signals(&rule, &bars), vec![(16, Side::Sell), (45, Side::Buy)]);

        let st = indicators::supertrend(&bars[..46], 10, 3.0);
        assert_eq!(rule.evaluate(&bars[..46]).buy, value_at(&st.line, 45));
    }

    #[test]
    fn rsi_gate_holds_back_a_weak_flip() {
        // RSI(14) is about 51 on the upward flip
        let gate = |level| ConfirmRule::SupertrendFlip {
            period: 10,
            multiplier: 3.0,
            rsi: Some(RsiGate { period: 14, level }),
        };
        let bars = v_shape();
        assert_eq!(signals(&gate(50.0), &bars), vec![(16, Side::Sell), (45, Side::Buy)]);
        assert_eq!(signals(&gate(52.0), &bars), vec![(16, Side::Sell)]);
    }

    #[test]
    fn ema_cross_against_the_trend_is_ignored() {
        let plain = ConfirmRule::EmaCross { fast: 9, slow: 21, trend: None };
        let filtered = ConfirmRule::EmaCross { fast: 9, slow: 21, trend: Some(50) };
        let bars = v_shape();
        assert_eq!(signals(&plain, &bars), vec![(1, Side::Sell), (48, Side::Buy)]);
        // slow EMA is still under the 50 EMA when the fast one crosses up
        assert_eq!(signals(&filtered, &bars), vec![(1, Side::Sell)]);
    }

    #[test]
    fn stochastic_cross_needs_the_extreme_zone() {
        let rule = ConfirmRule::StochasticCross {
            period: 14,
            k_smooth: 3,
            d_smooth: 3,
            oversold: 20.0,
            overbought: 80.0,
        };
        assert_eq!(signals(&rule, &v_shape()), vec![(40, Side::Buy)]);

        // %K crosses %D around 50 in a range, which is no signal
        let bars = range_then_trend();
        let range = &bars[..40];
        let s = indicators::stochastic(range, 14, 3, 3);
        assert!(crossed_above(&s.k, &s.d, 21));
        assert!(crossed_below(&s.k, &s.d, 19));
        assert!(signals(&rule, range).is_empty());
    }

    #[test]
    fn adx_rising_through_threshold() {
        let rule = ConfirmRule::AdxTrend { period: 14, threshold: 25.0 };
        let bars = range_then_trend();
        assert_eq!(signals(&rule, &bars), vec![(48, Side::Buy)]);

        let a = indicators::adx(&bars, 14);
        assert!(a.adx[47] < 25.0 && a.adx[48] > 25.0);
        assert!(a.plus_di[48] > a.minus_di[48]);
    }

    #[test]
    fn cci_quiet_window_drops_the_second_cross() {
        let cycle = [100.0, 102.0, 100.0, 98.0];
        let closes: Vec<f64> = (0..32).map(|i| cycle[i % 4]).chain([106.0, 104.0, 99.0, 107.0]).collect();
        let bars = make_bars(&closes);

        let quiet = ConfirmRule::CciCross { period: 20, level: 100.0, quiet_bars: Some(5) };
        let eager = ConfirmRule::CciCross { period: 20, level: 100.0, quiet_bars: None };
        assert_eq!(signals(&quiet, &bars), vec![(32, Side::Buy)]);
        assert_eq!(signals(&eager, &bars), vec![(32, Side::Buy), (35, Side::Buy)]);
    }

    #[test]
    fn band_breakout_needs_the_whole_bar_outside() {
        let rule = ConfirmRule::BandBreakout { period: 20, k: 2.0, std_mode: StdMode::Sample };
        let mut up = band_range(30);
        up.push(ohlc(30, 110.0, 112.0, 109.0, 111.0));
        let mut down = band_range(30);
        down.push(ohlc(30, 92.0, 93.0, 90.0, 91.0));

        let upper = indicators::bollinger(&column(&up, |b| b.close), 20, 2.0, StdMode::Sample).upper[30];
        assert_eq!(rule.evaluate(&up).buy, Some(upper));
        assert!(rule.evaluate(&up).sell.is_none());
        assert!(rule.evaluate(&down).sell.is_some());

        // a long wick through the band is not a breakout
        let mut wick = band_range(30);
        wick.push(ohlc(30, 101.0, 112.0, 100.5, 102.0));
        assert!(rule.evaluate(&wick).is_empty());
    }

    #[test]
    fn heikin_ashi_candles_use_raw_bands() {
        let mut bars = band_range(30);
        bars.push(ohlc(30, 101.0, 101.5, 90.0, 100.0));
        bars.push(ohlc(31, 100.0, 101.0, 99.0, 100.5));
        let closed = &bars[..31];
        let entry = EntryRule::BollingerTouch { period: 20, k: 2.0, std_mode: StdMode::Sample, touch: TouchPrice::Wick };
        let evaluate = |source| {
            evaluate_pair("B-BTC_USDT", &bars, source, Some(&entry), &ConfirmRule::CandleColor, SideFilter::BOTH)
                .unwrap()
        };

        let raw_lower = indicators::bollinger(&column(closed, |b| b.close), 20, 2.0, StdMode::Sample).lower[30];
        let ha = indicators::heikin_ashi(closed);
        let ha_lower = indicators::bollinger(&column(&ha, |b| b.close), 20, 2.0, StdMode::Sample).lower[30];
        assert_ne!(raw_lower, ha_lower);

        let on_raw = evaluate(PriceSource::HeikinAshiCandles);
        assert_eq!(on_raw.entry.buy, Some(raw_lower));
        assert_eq!(on_raw.bar, ha[30]);

        let on_ha = evaluate(PriceSource::HeikinAshi);
        assert_eq!(on_ha.entry.buy, Some(ha_lower));
        assert_eq!(on_ha.bar, ha[30]);
    }

    #[test]
    fn rules_round_trip_through_config_json() {
        let json = r#"{"kind": "bollinger_touch", "period": 20, "k": 2.0}"#;
        let rule: EntryRule = serde_json::from_str(json).unwrap();
        assert_eq!(
            rule,
            EntryRule::BollingerTouch { period: 20, k: 2.0, std_mode: StdMode::Sample, touch: TouchPrice::Wick }
        );
        let confirm: ConfirmRule = serde_json::from_str(r#"{"kind": "candle_color"}"#).unwrap();
        assert_eq!(confirm, ConfirmRule::CandleColor);
    }
}
