use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One daily OHLCV candle. Immutable once fetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Directional body as a fraction of the full candle range.
    /// Returns 0.0 for zero-range candles.
    pub fn body_ratio(&self) -> f64 {
        let range = self.high - self.low;
        if range <= 0.0 {
            return 0.0;
        }
        (self.close - self.open).abs() / range
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Live quote as normalized by a broker adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Previous day close.
    pub close: f64,
    pub volume: f64,
    pub ts: DateTime<Utc>,
}
