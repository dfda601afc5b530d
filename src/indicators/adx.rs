//! Average Directional Index with Wilder smoothing.
//!
//! +DM counts only when the up-move is positive and larger than the
//! down-move; -DM mirrors it. TR, +DM and -DM are Wilder-smoothed from the
//! first bar, DI = 100 * DM / TR, DX = 100 * |DI+ - DI-| / (DI+ + DI-), and
//! ADX = Wilder(DX). ADX is undefined before index 2 * period - 1.

use super::atr::true_range;
use super::smoothing::ewm;
use crate::candle::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct AdxSeries {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[PriceBar], period: usize) -> AdxSeries {
    let n = bars.len();
    if period == 0 {
        return AdxSeries {
            adx: vec![f64::NAN; n],
            plus_di: vec![f64::NAN; n],
            minus_di: vec![f64::NAN; n],
        };
    }
    let alpha = 1.0 / period as f64;

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let tr = ewm(&true_range(bars), alpha, 1);
    let plus = ewm(&plus_dm, alpha, 1);
    let minus = ewm(&minus_dm, alpha, 1);

    let ratio = |dm: f64, tr: f64| if tr > 0.0 { 100.0 * dm / tr } else { f64::NAN };
    let plus_di: Vec<f64> = plus.iter().zip(&tr).map(|(&d, &t)| ratio(d, t)).collect();
    let minus_di: Vec<f64> = minus.iter().zip(&tr).map(|(&d, &t)| ratio(d, t)).collect();

    let dx: Vec<f64> = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(&p, &m)| {
            let sum = p + m;
            if sum > 0.0 {
                100.0 * (p - m).abs() / sum
            } else {
                f64::NAN
            }
        })
        .collect();

    let mut adx = ewm(&dx, alpha, 1);
    for value in adx.iter_mut().take(2 * period - 1) {
        *value = f64::NAN;
    }

    AdxSeries {
        adx,
        plus_di,
        minus_di,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(step: f64, len: usize) -> Vec<PriceBar> {
        (0..len)
            .map(|i| {
                let c = 100.0 + step * i as f64;
                PriceBar { time: i as i64, open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 1.0 }
            })
            .collect()
    }

    #[test]
    fn steady_uptrend_is_all_plus() {
        let out = adx(&trending(2.0, 40), 5);
        assert!(out.adx[8].is_nan());
        assert!(!out.adx[9].is_nan());
        assert!(out.plus_di[39] > 0.0);
        assert_eq!(out.minus_di[39], 0.0);
        assert!(out.adx[39] > 90.0);
    }

    #[test]
    fn downtrend_favours_minus() {
        let out = adx(&trending(-2.0, 40), 5);
        assert!(out.minus_di[39] > out.plus_di[39]);
    }

    #[test]
    fn flat_bars_have_no_direction() {
        let bars: Vec<PriceBar> = (0..20)
            .map(|i| PriceBar { time: i, open: 10.0, high: 10.0, low: 10.0, close: 10.0, volume: 1.0 })
            .collect();
        let out = adx(&bars, 5);
        assert!(out.plus_di.iter().all(|v| v.is_nan()));
        assert!(out.adx.iter().all(|v| v.is_nan()));
    }
}
