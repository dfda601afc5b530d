use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One OHLCV observation. `time` is the bar open time in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// Every bar except the last one. The last bar of a fetched series is still
/// forming and never takes part in signal evaluation.
pub fn closed_bars(bars: &[PriceBar]) -> &[PriceBar] {
    &bars[..bars.len().saturating_sub(1)]
}

/// Extracts one field of every bar as a plain series.
pub fn column(bars: &[PriceBar], field: impl Fn(&PriceBar) -> f64) -> Vec<f64> {
    bars.iter().map(field).collect()
}

/// Sorts by time and keeps the last copy of any duplicated timestamp.
pub fn normalize(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.time);
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

// --- Wire format ---

/// A candle as the exchanges send it: numbers may arrive as strings, nulls or
/// garbage. Anything that does not coerce to a valid bar is dropped.
#[derive(Deserialize, Debug, Default)]
pub struct RawCandle {
    #[serde(default, alias = "openTime", deserialize_with = "deserialize_f64_lenient")]
    time: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    low: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    close: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    volume: Option<f64>,
}

impl RawCandle {
    pub fn into_bar(self) -> Option<PriceBar> {
        let time = self.time.filter(|t| t.is_finite())?;
        let bar = PriceBar {
            time: time as i64,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume.unwrap_or(0.0),
        };
        bar.is_valid().then_some(bar)
    }
}

/// Parses a list of JSON candle objects row by row, so one malformed row never
/// spoils the rest of the payload.
pub fn parse_candles(rows: &[serde_json::Value]) -> Vec<PriceBar> {
    let bars = rows
        .iter()
        .filter_map(|row| RawCandle::deserialize(row).ok())
        .filter_map(RawCandle::into_bar)
        .collect();
    normalize(bars)
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(v.trim().parse::<f64>().ok())
    }

    fn visit_bool<E>(self, _v: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}
