//! Indicator engine.
//!
//! Every indicator is a pure function from a price series to a derived series
//! of the same length. Undefined values (warm-up prefix, zero denominators)
//! are `f64::NAN`; callers read them through [`value_at`], which turns
//! anything non-finite into `None` so it can never take part in a comparison.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod heikin_ashi;
pub mod macd;
pub mod rsi;
pub mod smoothing;
pub mod stochastic;
pub mod supertrend;
pub mod williams;

pub use adx::{AdxSeries, adx};
pub use atr::{atr, true_range};
pub use bollinger::{BollingerBands, StdMode, bollinger};
pub use cci::cci;
pub use heikin_ashi::heikin_ashi;
pub use macd::{MacdSeries, macd};
pub use rsi::rsi;
pub use smoothing::{ema, ewm, sma, wilder};
pub use stochastic::{StochasticSeries, stochastic};
pub use supertrend::{SupertrendSeries, Trend, supertrend};
pub use williams::williams_r;

/// The value at `i`, or `None` when it is out of range or undefined.
pub fn value_at(series: &[f64], i: usize) -> Option<f64> {
    series.get(i).copied().filter(|v| v.is_finite())
}

/// `a` was at or below `b` on the previous bar and is strictly above it on `i`.
pub fn crossed_above(a: &[f64], b: &[f64], i: usize) -> bool {
    let Some(prev) = i.checked_sub(1) else {
        return false;
    };
    match (value_at(a, prev), value_at(b, prev), value_at(a, i), value_at(b, i)) {
        (Some(ap), Some(bp), Some(a), Some(b)) => ap <= bp && a > b,
        _ => false,
    }
}

/// `a` was at or above `b` on the previous bar and is strictly below it on `i`.
pub fn crossed_below(a: &[f64], b: &[f64], i: usize) -> bool {
    let Some(prev) = i.checked_sub(1) else {
        return false;
    };
    match (value_at(a, prev), value_at(b, prev), value_at(a, i), value_at(b, i)) {
        (Some(ap), Some(bp), Some(a), Some(b)) => ap >= bp && a < b,
        _ => false,
    }
}

pub fn crossed_above_level(series: &[f64], level: f64, i: usize) -> bool {
    let Some(prev) = i.checked_sub(1) else {
        return false;
    };
    matches!(
        (value_at(series, prev), value_at(series, i)),
        (Some(p), Some(c)) if p <= level && c > level
    )
}

pub fn crossed_below_level(series: &[f64], level: f64, i: usize) -> bool {
    let Some(prev) = i.checked_sub(1) else {
        return false;
    };
    matches!(
        (value_at(series, prev), value_at(series, i)),
        (Some(p), Some(c)) if p >= level && c < level
    )
}

/// Synthetic bars from closes: open = previous close, high/low one unit
/// outside the body, time = index in hours.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::candle::PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            crate::candle::PriceBar {
                time: i as i64 * 3_600_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
