//! Stochastic oscillator.
//!
//! raw %K = 100 * (close - lowest low) / (highest high - lowest low) over
//! `period`, %K = SMA(raw %K, k_smooth), %D = SMA(%K, d_smooth).

use super::smoothing::sma;
use crate::candle::PriceBar;
use ta::Next;
use ta::indicators::{Maximum, Minimum};

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Highest high and lowest low over a trailing window, undefined until the
/// window is full.
pub(crate) fn rolling_high_low(bars: &[PriceBar], period: usize) -> (Vec<f64>, Vec<f64>) {
    let n = bars.len();
    let mut highs = vec![f64::NAN; n];
    let mut lows = vec![f64::NAN; n];

    let (Ok(mut max), Ok(mut min)) = (Maximum::new(period), Minimum::new(period)) else {
        return (highs, lows);
    };

    for (i, bar) in bars.iter().enumerate() {
        let high = max.next(bar.high);
        let low = min.next(bar.low);
        if i + 1 >= period {
            highs[i] = high;
            lows[i] = low;
        }
    }
    (highs, lows)
}

pub fn stochastic(
    bars: &[PriceBar],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> StochasticSeries {
    let (highs, lows) = rolling_high_low(bars, period);

    let raw: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = highs[i] - lows[i];
            if range > 0.0 {
                100.0 * (bar.close - lows[i]) / range
            } else {
                f64::NAN
            }
        })
        .collect();

    let k = sma(&raw, k_smooth);
    let d = sma(&k, d_smooth);
    StochasticSeries { k, d }
}
