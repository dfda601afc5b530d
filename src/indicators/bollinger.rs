//! Bollinger Bands: rolling mean +/- k rolling standard deviations.
//!
//! The deviation flavour is explicit: `Sample` divides by N-1, `Population`
//! by N. Windows shorter than the period are undefined.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StdMode {
    #[default]
    Sample,
    Population,
}

impl StdMode {
    fn ddof(self) -> usize {
        match self {
            StdMode::Sample => 1,
            StdMode::Population => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], period: usize, k: f64, mode: StdMode) -> BollingerBands {
    let n = values.len();
    let mut bands = BollingerBands {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if period == 0 || period <= mode.ddof() || n < period {
        return bands;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if !window.iter().all(|v| v.is_finite()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let squares: f64 = window.iter().map(|v| (v - mean) * (v - mean)).sum();
        let std = (squares / (period - mode.ddof()) as f64).sqrt();

        bands.middle[i] = mean;
        bands.upper[i] = mean + k * std;
        bands.lower[i] = mean - k * std;
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{DEFAULT_EPSILON, assert_approx};

    #[test]
    fn population_bands() {
        // window 2, 4 -> mean 3, population std 1
        let bands = bollinger(&[2.0, 4.0], 2, 2.0, StdMode::Population);
        assert!(bands.middle[0].is_nan());
        assert_approx(bands.middle[1], 3.0, DEFAULT_EPSILON);
        assert_approx(bands.upper[1], 5.0, DEFAULT_EPSILON);
        assert_approx(bands.lower[1], 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sample_bands_are_wider() {
        let closes = [2.0, 4.0, 6.0];
        let sample = bollinger(&closes, 3, 1.0, StdMode::Sample);
        let population = bollinger(&closes, 3, 1.0, StdMode::Population);
        // sample std = 2, population std = sqrt(8/3)
        assert_approx(sample.upper[2], 6.0, DEFAULT_EPSILON);
        assert_approx(population.upper[2], 4.0 + (8.0f64 / 3.0).sqrt(), DEFAULT_EPSILON);
        assert!(sample.lower[2] < population.lower[2]);
    }

    #[test]
    fn flat_series_collapses_bands() {
        let bands = bollinger(&[5.0; 4], 3, 3.0, StdMode::Sample);
        assert_eq!(bands.upper[3], 5.0);
        assert_eq!(bands.lower[3], 5.0);
    }

    #[test]
    fn degenerate_periods() {
        assert!(bollinger(&[1.0, 2.0], 1, 2.0, StdMode::Sample).upper.iter().all(|v| v.is_nan()));
        assert!(bollinger(&[1.0, 2.0], 3, 2.0, StdMode::Sample).upper.iter().all(|v| v.is_nan()));
    }
}
