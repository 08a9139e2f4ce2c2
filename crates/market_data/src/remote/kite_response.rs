use serde::Deserialize;
use std::collections::HashMap;

/// Every Kite Connect endpoint wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
pub struct KiteEnvelope<T> {
    pub status: String,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KiteSessionData {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KiteHoldingRow {
    pub tradingsymbol: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub last_price: f64,
}

/// `/portfolio/positions` groups rows into day and net; reconciliation only
/// cares about net.
#[derive(Debug, Deserialize)]
pub struct KitePositionsData {
    #[serde(default)]
    pub net: Vec<KiteHoldingRow>,
}

#[derive(Debug, Deserialize)]
pub struct KiteMarginsData {
    #[serde(default)]
    pub net: f64,
}

#[derive(Debug, Deserialize)]
pub struct KiteOhlc {
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub close: f64,
}

#[derive(Debug, Deserialize)]
pub struct KiteQuoteRow {
    #[serde(default)]
    pub last_price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub ohlc: Option<KiteOhlc>,
}

pub type KiteQuoteData = HashMap<String, KiteQuoteRow>;

/// Candle rows arrive as positional arrays:
/// [timestamp, open, high, low, close, volume].
#[derive(Debug, Deserialize)]
pub struct KiteCandle(pub String, pub f64, pub f64, pub f64, pub f64, pub f64);

#[derive(Debug, Deserialize)]
pub struct KiteCandlesData {
    #[serde(default)]
    pub candles: Vec<KiteCandle>,
}
