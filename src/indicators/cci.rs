//! Commodity Channel Index over the typical price (H+L+C)/3.
//!
//! CCI = (TP - SMA(TP)) / (0.015 * mean absolute deviation). A zero
//! deviation leaves the value undefined.

use crate::candle::PriceBar;

pub fn cci(bars: &[PriceBar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }

    let tp: Vec<f64> = bars.iter().map(PriceBar::typical_price).collect();
    for i in (period - 1)..n {
        let window = &tp[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let mad = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        if mad > 0.0 && mad.is_finite() {
            out[i] = (tp[i] - mean) / (0.015 * mad);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    fn flat_bars(tps: &[f64]) -> Vec<PriceBar> {
        tps.iter()
            .enumerate()
            .map(|(i, &tp)| PriceBar {
                time: i as i64,
                open: tp,
                high: tp,
                low: tp,
                close: tp,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn linear_series_known_value() {
        // window 1..=5: mean 3, deviation 1.2, last tp 5 -> 2 / 0.018
        let out = cci(&flat_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);
        assert!(out[3].is_nan());
        assert_approx(out[4], 2.0 / 0.018, 1e-6);
    }

    #[test]
    fn zero_deviation_is_undefined() {
        let out = cci(&flat_bars(&[7.0; 6]), 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
