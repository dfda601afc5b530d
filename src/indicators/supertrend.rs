//! Supertrend — ATR bands that ratchet toward price.
//!
//! Inherently sequential: every final band depends on the previous final band
//! and the previous close, and the trend depends on the previous final bands.
//! One strict left-to-right pass.
//!
//! - basic bands: (H+L)/2 +/- multiplier * ATR (Wilder, seeded on bar 0)
//! - final upper: basic upper if it is below the previous final upper or the
//!   previous close closed above it, else the previous final upper
//! - final lower: mirror image
//! - trend (from index `period`): up when close > previous final upper, down
//!   when close < previous final lower, otherwise unchanged. `None` until the
//!   first flip.
//! - line: final lower while up, final upper while down.

use super::atr::atr;
use crate::candle::PriceBar;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendSeries {
    pub final_upper: Vec<f64>,
    pub final_lower: Vec<f64>,
    pub line: Vec<f64>,
    pub trend: Vec<Option<Trend>>,
}

pub fn supertrend(bars: &[PriceBar], period: usize, multiplier: f64) -> SupertrendSeries {
    let n = bars.len();
    let mut out = SupertrendSeries {
        final_upper: vec![f64::NAN; n],
        final_lower: vec![f64::NAN; n],
        line: vec![f64::NAN; n],
        trend: vec![None; n],
    };
    if period == 0 {
        return out;
    }

    let atr = atr(bars, period);
    let mut trend: Option<Trend> = None;

    for i in 0..n {
        let hl2 = (bars[i].high + bars[i].low) / 2.0;
        let basic_upper = hl2 + multiplier * atr[i];
        let basic_lower = hl2 - multiplier * atr[i];

        if i == 0 {
            out.final_upper[0] = basic_upper;
            out.final_lower[0] = basic_lower;
            continue;
        }

        let prev_upper = out.final_upper[i - 1];
        let prev_lower = out.final_lower[i - 1];
        let prev_close = bars[i - 1].close;

        out.final_upper[i] = if basic_upper < prev_upper || prev_close > prev_upper {
            basic_upper
        } else {
            prev_upper
        };
        out.final_lower[i] = if basic_lower > prev_lower || prev_close < prev_lower {
            basic_lower
        } else {
            prev_lower
        };

        if i < period {
            continue;
        }

        let close = bars[i].close;
        if close > prev_upper {
            trend = Some(Trend::Up);
        } else if close < prev_lower {
            trend = Some(Trend::Down);
        }

        out.trend[i] = trend;
        out.line[i] = match trend {
            Some(Trend::Up) => out.final_lower[i],
            Some(Trend::Down) => out.final_upper[i],
            None => f64::NAN,
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlc(data: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| PriceBar {
                time: i as i64,
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn breakout_flips_up_and_line_sits_below_price() {
        let mut data = Vec::new();
        for _ in 0..12 {
            data.push((100.0, 101.0, 99.0, 100.0));
        }
        for i in 0..10 {
            let base = 110.0 + i as f64 * 5.0;
            data.push((base - 2.0, base + 1.0, base - 3.0, base));
        }
        let bars = ohlc(&data);
        let st = supertrend(&bars, 3, 2.0);

        assert_eq!(st.trend[12], Some(Trend::Up));
        for i in 12..bars.len() {
            assert_eq!(st.trend[i], Some(Trend::Up));
            assert!(st.line[i] < bars[i].close);
        }
    }

    #[test]
    fn breakdown_flips_down() {
        let mut data = Vec::new();
        for _ in 0..12 {
            data.push((100.0, 101.0, 99.0, 100.0));
        }
        for i in 0..6 {
            let base = 90.0 - i as f64 * 5.0;
            data.push((base + 2.0, base + 3.0, base - 1.0, base));
        }
        let st = supertrend(&ohlc(&data), 3, 2.0);
        assert_eq!(st.trend[12], Some(Trend::Down));
        assert!(st.line[17] > 65.0);
    }

    #[test]
    fn range_holds_undecided_trend() {
        let data = vec![(100.0, 101.0, 99.0, 100.0); 10];
        let st = supertrend(&ohlc(&data), 3, 2.0);
        assert!(st.trend.iter().all(Option::is_none));
        assert!(st.line.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn upper_band_only_tightens_below_price() {
        let mut data = vec![(100.0, 104.0, 96.0, 100.0)];
        for i in 1..15 {
            let c = 100.0 - i as f64 * 0.5;
            data.push((c + 0.2, c + 0.5, c - 0.5, c));
        }
        let bars = ohlc(&data);
        let st = supertrend(&bars, 3, 1.5);
        for i in 1..bars.len() {
            if bars[i - 1].close <= st.final_upper[i - 1] {
                assert!(st.final_upper[i] <= st.final_upper[i - 1]);
            }
        }
    }

    #[test]
    fn zero_period() {
        let st = supertrend(&ohlc(&[(1.0, 2.0, 0.5, 1.5)]), 0, 2.0);
        assert!(st.final_upper[0].is_nan());
    }
}
