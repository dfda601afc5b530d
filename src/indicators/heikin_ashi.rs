//! Heikin-Ashi candles.
//!
//! HA_Open depends on the previous HA candle, so this is a single forward
//! pass. Time and volume are carried over from the raw bars.

use crate::candle::PriceBar;

pub fn heikin_ashi(bars: &[PriceBar]) -> Vec<PriceBar> {
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());

    for bar in bars {
        let ha_close = (bar.open + bar.high + bar.low + bar.close) / 4.0;
        let ha_open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => (bar.open + bar.close) / 2.0,
        };
        out.push(PriceBar {
            time: bar.time,
            open: ha_open,
            high: bar.high.max(ha_open).max(ha_close),
            low: bar.low.min(ha_open).min(ha_close),
            close: ha_close,
            volume: bar.volume,
        });
    }
    out
}
