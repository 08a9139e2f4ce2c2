use serde::Deserialize;

/// SmartAPI envelope. Numeric fields frequently arrive as strings, so rows
/// keep them raw and the adapter parses with fallbacks.
#[derive(Debug, Deserialize)]
pub struct SmartApiEnvelope<T> {
    #[serde(default)]
    pub status: bool,
    pub message: Option<String>,
    pub errorcode: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmartApiHoldingRow {
    #[serde(default)]
    pub tradingsymbol: String,
    #[serde(default)]
    pub quantity: serde_json::Value,
    #[serde(default)]
    pub netqty: serde_json::Value,
    #[serde(default)]
    pub averageprice: serde_json::Value,
    #[serde(default)]
    pub ltp: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SmartApiRmsData {
    #[serde(default)]
    pub net: serde_json::Value,
}

/// Candle rows: [timestamp, open, high, low, close, volume].
#[derive(Debug, Deserialize)]
pub struct SmartApiCandle(pub String, pub f64, pub f64, pub f64, pub f64, pub f64);

#[derive(Debug, Deserialize)]
pub struct SmartApiQuoteData {
    #[serde(default)]
    pub fetched: Vec<SmartApiQuoteRow>,
}

#[derive(Debug, Deserialize)]
pub struct SmartApiQuoteRow {
    #[serde(default, rename = "tradingSymbol")]
    pub trading_symbol: String,
    #[serde(default)]
    pub ltp: f64,
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub close: f64,
    #[serde(default, rename = "tradeVolume")]
    pub trade_volume: f64,
}

/// One row of the published instrument master
/// (OpenAPIScripMaster.json, refreshed nightly).
#[derive(Debug, Deserialize)]
pub struct ScripMasterRow {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub exch_seg: String,
}

/// SmartAPI numbers come as numbers or strings depending on the endpoint.
pub fn value_to_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_parse_from_both_shapes() {
        assert_eq!(value_to_f64(&json!(12.5)), 12.5);
        assert_eq!(value_to_f64(&json!("12.5")), 12.5);
        assert_eq!(value_to_f64(&json!(null)), 0.0);
        assert_eq!(value_to_f64(&json!("n/a")), 0.0);
    }
}
