//! Exponential and windowed smoothing.
//!
//! Exponential smoothing never reweights history (`adjust=False`):
//! S(first) = x(first), S(i) = S(i-1) + alpha * (x(i) - S(i-1)).

/// Exponential smoothing with a fixed decay.
///
/// Leading undefined inputs are skipped; the first finite input seeds the
/// recurrence. Undefined inputs later on hold the previous value, but history
/// keeps decaying across them: after a gap of `g` bars the next input is
/// weighed against `(1 - alpha)^(g + 1)` of the state, as pandas does with
/// `ignore_na=False`. Output stays undefined until `min_periods` finite inputs
/// have been consumed.
pub fn ewm(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if !(alpha > 0.0 && alpha <= 1.0) {
        return out;
    }

    let min_periods = min_periods.max(1);
    let mut state: Option<f64> = None;
    let mut seen = 0usize;
    let mut gap = 0i32;

    for (i, &x) in values.iter().enumerate() {
        if x.is_finite() {
            seen += 1;
            state = Some(match state {
                None => x,
                Some(prev) if gap == 0 => prev + alpha * (x - prev),
                Some(prev) => {
                    let decayed = (1.0 - alpha).powi(gap + 1);
                    (decayed * prev + alpha * x) / (decayed + alpha)
                }
            });
            gap = 0;
        } else if state.is_some() {
            gap += 1;
        }
        if seen >= min_periods {
            if let Some(s) = state {
                out[i] = s;
            }
        }
    }
    out
}

/// Wilder smoothing: alpha = 1/period, defined after `period` observations.
pub fn wilder(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    ewm(values, 1.0 / period as f64, period)
}

/// Standard EMA: alpha = 2/(span+1), seeded with the first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return vec![f64::NAN; values.len()];
    }
    ewm(values, 2.0 / (span as f64 + 1.0), 1)
}

/// Simple rolling mean. A short window or any undefined value inside the
/// window gives an undefined result.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            out[i] = slice.iter().sum::<f64>() / window as f64;
        }
    }
    out
}
