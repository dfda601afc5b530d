use super::smoothing::ewm;
use crate::candle::PriceBar;

/// True range. The first bar has no previous close, so it is high - low.
pub fn true_range(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => hl
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Wilder-smoothed true range, seeded with the first bar.
pub fn atr(bars: &[PriceBar], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; bars.len()];
    }
    ewm(&true_range(bars), 1.0 / period as f64, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{DEFAULT_EPSILON, assert_approx};

    fn bar(high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar { time: 0, open: close, high, low, close, volume: 0.0 }
    }

    #[test]
    fn gap_up_uses_previous_close() {
        let bars = [bar(10.0, 9.0, 9.5), bar(13.0, 12.0, 12.5)];
        let tr = true_range(&bars);
        assert_approx(tr[0], 1.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_is_smoothed_true_range() {
        let bars = [bar(10.0, 9.0, 9.5), bar(13.0, 12.0, 12.5)];
        let out = atr(&bars, 2);
        assert_approx(out[0], 1.0, DEFAULT_EPSILON);
        assert_approx(out[1], 2.25, DEFAULT_EPSILON);
    }
}
