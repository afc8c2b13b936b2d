use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// OHLCV bar for a single period.
///
/// Bars are created by a data stream and never mutated afterwards; everyone
/// downstream clones or borrows. The producer guarantees
/// `low <= open, close <= high` and `low > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f64,
    /// Open bag for producer-specific fields (spread, tick count, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

impl Bar {
    pub fn new(timestamp: i64, open: f32, high: f32, low: f32, close: f32, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            extras: HashMap::new(),
        }
    }

    /// A bar whose four prices are all equal. Handy for fixtures and for
    /// synthetic series with zero intrabar range.
    pub fn flat(timestamp: i64, price: f32, volume: f64) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    pub fn with_extras(mut self, extras: HashMap<String, serde_json::Value>) -> Self {
        self.extras = extras;
        self
    }
}

/// Period covered by one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn to_minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn to_seconds(&self) -> i64 {
        self.to_minutes() as i64 * 60
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(EngineError::InvalidTimeframe(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_string_roundtrip() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.to_string().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn timeframe_to_minutes() {
        let expected = [1u32, 5, 15, 30, 60, 240, 1440];
        for (tf, minutes) in Timeframe::ALL.iter().zip(expected) {
            assert_eq!(tf.to_minutes(), minutes);
        }
    }

    #[test]
    fn timeframe_rejects_unknown_string() {
        assert!(matches!(
            "2h".parse::<Timeframe>(),
            Err(EngineError::InvalidTimeframe(_))
        ));
    }

    #[test]
    fn flat_bar_has_equal_prices() {
        let bar = Bar::flat(100, 10.0, 1.0);
        assert_eq!(bar.open, bar.close);
        assert_eq!(bar.high, bar.low);
        assert!(bar.extras.is_empty());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let extras = HashMap::from([("spread".to_string(), serde_json::json!(0.02))]);
        let bar =
            Bar::new(1_700_000_000, 99.5, 101.0, 99.0, 100.5, 12_345.0).with_extras(extras);
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bar);
        assert_eq!(back.extras["spread"], serde_json::json!(0.02));
    }
}
