use super::stochastic::rolling_high_low;
use crate::candle::PriceBar;

/// Williams %R in [-100, 0]: -100 * (highest high - close) / (highest high -
/// lowest low). A zero range is undefined.
pub fn williams_r(bars: &[PriceBar], period: usize) -> Vec<f64> {
    let (highs, lows) = rolling_high_low(bars, period);
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = highs[i] - lows[i];
            if range > 0.0 {
                -100.0 * (highs[i] - bar.close) / range
            } else {
                f64::NAN
            }
        })
        .collect()
}
