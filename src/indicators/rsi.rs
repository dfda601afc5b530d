//! Relative Strength Index with Wilder-smoothed gains and losses.
//!
//! First defined value at index `period`. avg_loss == 0 gives 100.

use super::smoothing::wilder;

pub fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];

    for i in 1..n {
        let delta = close[i] - close[i - 1];
        if delta.is_finite() {
            gains[i] = delta.max(0.0);
            losses[i] = (-delta).max(0.0);
        }
    }

    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| from_averages(g, l))
        .collect()
}

fn from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if !avg_gain.is_finite() || !avg_loss.is_finite() {
        f64::NAN
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
