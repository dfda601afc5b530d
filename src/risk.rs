//! Position sizing shared by every scanner.
//!
//! Picks the highest leverage in `min_leverage..=max_leverage` whose loss at
//! the stop stays within `max_loss`, falling back to `min_leverage`, and
//! projects reward targets at fixed multiples of the stop distance.

use crate::rules::Side;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RiskParams {
    pub capital: f64,
    pub max_loss: f64,
    pub min_leverage: u32,
    pub max_leverage: u32,
    #[serde(default = "default_reward_multiples")]
    pub reward_multiples: Vec<f64>,
}

fn default_reward_multiples() -> Vec<f64> {
    vec![2.0, 3.0, 4.0]
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            capital: 500.0,
            max_loss: 50.0,
            min_leverage: 5,
            max_leverage: 30,
            reward_multiples: default_reward_multiples(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub multiple: f64,
    pub price: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub side: Side,
    pub entry: f64,
    pub stop: f64,
    pub leverage: u32,
    pub capital: f64,
    pub position_value: f64,
    /// Loss if the stop is hit at the chosen leverage.
    pub risk_amount: f64,
    pub targets: Vec<Target>,
}

/// Highest leverage whose loss at the stop fits `max_loss`, else the floor.
pub fn select_leverage(entry: f64, stop: f64, params: &RiskParams) -> u32 {
    let risk_fraction = (entry - stop).abs() / entry;
    (params.min_leverage..=params.max_leverage)
        .rev()
        .find(|&leverage| risk_fraction * params.capital * leverage as f64 <= params.max_loss)
        .unwrap_or(params.min_leverage)
}

pub fn plan_trade(side: Side, entry: f64, stop: f64, params: &RiskParams) -> Option<TradePlan> {
    if !(entry.is_finite() && entry > 0.0 && stop.is_finite()) {
        return None;
    }
    if params.min_leverage > params.max_leverage {
        return None;
    }

    let risk = (entry - stop).abs();
    let leverage = select_leverage(entry, stop, params);
    let position_value = params.capital * leverage as f64;

    let targets = params
        .reward_multiples
        .iter()
        .map(|&multiple| Target {
            multiple,
            price: match side {
                Side::Buy => entry + multiple * risk,
                Side::Sell => entry - multiple * risk,
            },
        })
        .collect();

    Some(TradePlan {
        side,
        entry,
        stop,
        leverage,
        capital: params.capital,
        position_value,
        risk_amount: risk / entry * position_value,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_floor_when_nothing_fits() {
        let params = RiskParams::default();
        let plan = plan_trade(Side::Buy, 100.0, 95.0, &params).unwrap();
        // (5/100) * 500 * leverage <= 50 only holds up to leverage 2
        assert_eq!(plan.leverage, 5);
        let prices: Vec<f64> = plan.targets.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![110.0, 115.0, 120.0]);
        assert_eq!(plan.position_value, 2500.0);
    }

    #[test]
    fn picks_highest_fitting_leverage() {
        let params = RiskParams::default();
        // 1% risk: 0.01 * 500 * lev <= 50 -> lev <= 10
        assert_eq!(select_leverage(100.0, 99.0, &params), 10);
        // tight stop: everything fits, take the ceiling
        assert_eq!(select_leverage(100.0, 99.99, &params), 30);
    }

    #[test]
    fn sell_targets_go_down() {
        let plan = plan_trade(Side::Sell, 50.0, 52.0, &RiskParams::default()).unwrap();
        let prices: Vec<f64> = plan.targets.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![46.0, 44.0, 42.0]);
    }

    #[test]
    fn rejects_bad_inputs() {
        let params = RiskParams::default();
        assert!(plan_trade(Side::Buy, 0.0, 1.0, &params).is_none());
        assert!(plan_trade(Side::Buy, f64::NAN, 1.0, &params).is_none());
        let inverted = RiskParams { min_leverage: 10, max_leverage: 5, ..RiskParams::default() };
        assert!(plan_trade(Side::Buy, 100.0, 95.0, &inverted).is_none());
    }
}
