use super::smoothing::ema;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line = EMA(fast) - EMA(slow); signal = EMA of the MACD line.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();

    MacdSeries {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{crossed_above, crossed_below};

    #[test]
    fn constant_series_is_flat_zero() {
        let out = macd(&[50.0; 30], 12, 26, 9);
        assert!(out.macd.iter().all(|v| *v == 0.0));
        assert!(out.histogram.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn turn_produces_crosses() {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..40).map(|i| 61.0 + 2.0 * i as f64));
        let out = macd(&closes, 3, 6, 3);
        let ups = (1..closes.len())
            .filter(|&i| crossed_above(&out.macd, &out.signal, i))
            .count();
        assert!(ups >= 1);
        let downs_after_turn = (45..closes.len())
            .filter(|&i| crossed_below(&out.macd, &out.signal, i))
            .count();
        assert_eq!(downs_after_turn, 0);
    }
}
