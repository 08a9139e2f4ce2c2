use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::error::{BrokerError, MarketDataError};
use common::models::{Bar, BrokerHolding, Quote, TradeAction};

use super::kite_response::{
    KiteCandlesData, KiteEnvelope, KiteHoldingRow, KiteMarginsData, KitePositionsData,
    KiteQuoteData, KiteSessionData,
};
use crate::traits::{BrokerGateway, MarketDataSource};

const KITE_BASE_URL: &str = "https://api.kite.trade";

/// Zerodha Kite Connect adapter. Holdings and net positions are merged into
/// one normalized view; instrument tokens come from the NSE instrument dump,
/// cached for the process lifetime.
pub struct ZerodhaClient {
    http: Client,
    base_url: String,
    api_key: String,
    access_token: String,
    instruments: RwLock<HashMap<String, u64>>,
}

impl ZerodhaClient {
    pub fn new(api_key: String, access_token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: KITE_BASE_URL.to_string(),
            api_key,
            access_token,
            instruments: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Exchange a one-time request token for a session access token.
    /// The checksum is SHA-256 over api_key + request_token + api_secret.
    pub async fn generate_session(
        &self,
        request_token: &str,
        api_secret: &str,
    ) -> Result<String, BrokerError> {
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        hasher.update(request_token.as_bytes());
        hasher.update(api_secret.as_bytes());
        let checksum = hex::encode(hasher.finalize());

        let response = self
            .http
            .post(format!("{}/session/token", self.base_url))
            .header("X-Kite-Version", "3")
            .form(&[
                ("api_key", self.api_key.as_str()),
                ("request_token", request_token),
                ("checksum", checksum.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        let envelope: KiteEnvelope<KiteSessionData> = response
            .json()
            .await
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?;
        let data = unwrap_envelope(envelope)?;
        info!("Zerodha session created successfully");
        Ok(data.access_token)
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BrokerError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(BrokerError::Auth("access token rejected".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::BadResponse(format!("{status}: {body}")));
        }

        let envelope: KiteEnvelope<T> = response
            .json()
            .await
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?;
        unwrap_envelope(envelope)
    }

    /// Resolve a trading symbol to its instrument token via the NSE dump
    /// (CSV, fetched once per process).
    async fn instrument_token(&self, symbol: &str) -> Result<Option<u64>, BrokerError> {
        if let Some(&token) = self.instruments.read().await.get(symbol) {
            return Ok(Some(token));
        }

        let response = self
            .http
            .get(format!("{}/instruments/NSE", self.base_url))
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BrokerError::BadResponse(format!(
                "instrument dump: {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?;

        let mut cache = self.instruments.write().await;
        let mut reader = csv::Reader::from_reader(body.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?
            .clone();
        let token_idx = headers.iter().position(|h| h == "instrument_token");
        let symbol_idx = headers.iter().position(|h| h == "tradingsymbol");
        let (Some(token_idx), Some(symbol_idx)) = (token_idx, symbol_idx) else {
            return Err(BrokerError::BadResponse(
                "instrument dump missing expected columns".to_string(),
            ));
        };

        for record in reader.records() {
            let record = record.map_err(|e| BrokerError::BadResponse(e.to_string()))?;
            if let (Some(sym), Some(tok)) = (record.get(symbol_idx), record.get(token_idx)) {
                if let Ok(tok) = tok.parse::<u64>() {
                    cache.insert(sym.to_string(), tok);
                }
            }
        }
        info!("Loaded {} NSE instruments from Kite dump", cache.len());
        Ok(cache.get(symbol).copied())
    }
}

fn unwrap_envelope<T>(envelope: KiteEnvelope<T>) -> Result<T, BrokerError> {
    if envelope.status != "success" {
        let message = envelope.message.unwrap_or_else(|| "unknown error".to_string());
        return match envelope.error_type.as_deref() {
            Some("TokenException") => Err(BrokerError::Auth(message)),
            _ => Err(BrokerError::BadResponse(message)),
        };
    }
    envelope
        .data
        .ok_or_else(|| BrokerError::BadResponse("empty data payload".to_string()))
}

fn normalize(row: &KiteHoldingRow) -> BrokerHolding {
    let side = if row.quantity < 0 {
        TradeAction::Sell
    } else {
        TradeAction::Buy
    };
    BrokerHolding {
        symbol: row.tradingsymbol.clone(),
        quantity: row.quantity.abs(),
        avg_price: row.average_price,
        last_price: row.last_price,
        side,
    }
}

#[async_trait]
impl BrokerGateway for ZerodhaClient {
    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerError> {
        let holdings: Vec<KiteHoldingRow> =
            self.get_json("/portfolio/holdings", &[]).await?;
        let positions: KitePositionsData =
            self.get_json("/portfolio/positions", &[]).await?;

        // Delivery holdings first, then net positions override: a stock both
        // held and traded today shows its freshest state.
        let mut merged: BTreeMap<String, BrokerHolding> = BTreeMap::new();
        for row in holdings.iter().chain(positions.net.iter()) {
            if row.tradingsymbol.is_empty() {
                continue;
            }
            merged.insert(row.tradingsymbol.clone(), normalize(row));
        }
        Ok(merged.into_values().collect())
    }

    async fn cash_balance(&self) -> Result<f64, BrokerError> {
        let margins: KiteMarginsData = self.get_json("/user/margins/equity", &[]).await?;
        Ok(margins.net)
    }
}

#[async_trait]
impl MarketDataSource for ZerodhaClient {
    async fn daily_bars(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let token = self
            .instrument_token(symbol)
            .await?
            .ok_or_else(|| MarketDataError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown instrument".to_string(),
            })?;

        let to = Utc::now();
        let from = to - Duration::days(i64::from(lookback_days));
        let path = format!("/instruments/historical/{token}/day");
        let data: KiteCandlesData = self
            .get_json(
                &path,
                &[
                    ("from", from.format("%Y-%m-%d %H:%M:%S").to_string()),
                    ("to", to.format("%Y-%m-%d %H:%M:%S").to_string()),
                ],
            )
            .await?;

        let mut bars = Vec::with_capacity(data.candles.len());
        for candle in &data.candles {
            match parse_kite_timestamp(&candle.0) {
                Some(ts) => bars.push(Bar {
                    ts,
                    open: candle.1,
                    high: candle.2,
                    low: candle.3,
                    close: candle.4,
                    volume: candle.5,
                }),
                None => warn!("{symbol}: unparseable candle timestamp '{}'", candle.0),
            }
        }
        bars.sort_by_key(|b| b.ts);

        if bars.is_empty() {
            return Err(MarketDataError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no candles returned".to_string(),
            });
        }
        Ok(bars)
    }

    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, MarketDataError> {
        let query: Vec<(&str, String)> = symbols
            .iter()
            .map(|s| ("i", format!("NSE:{s}")))
            .collect();
        let data: KiteQuoteData = self.get_json("/quote", &query).await?;

        let now = Utc::now();
        let mut quotes = HashMap::new();
        for symbol in symbols {
            let key = format!("NSE:{symbol}");
            if let Some(row) = data.get(&key) {
                let ohlc = row.ohlc.as_ref();
                quotes.insert(
                    symbol.clone(),
                    Quote {
                        symbol: symbol.clone(),
                        last_price: row.last_price,
                        open: ohlc.map_or(0.0, |o| o.open),
                        high: ohlc.map_or(0.0, |o| o.high),
                        low: ohlc.map_or(0.0, |o| o.low),
                        close: ohlc.map_or(0.0, |o| o.close),
                        volume: row.volume,
                        ts: now,
                    },
                );
            }
        }
        Ok(quotes)
    }
}

/// Kite timestamps come as "2024-01-15T09:15:00+0530", an RFC 3339 lookalike
/// with a colon-less offset.
fn parse_kite_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kite_offset_timestamps() {
        let ts = parse_kite_timestamp("2024-01-15T09:15:00+0530").unwrap();
        assert_eq!(ts.format("%H:%M").to_string(), "03:45"); // IST -> UTC
        assert!(parse_kite_timestamp("2024-01-15T09:15:00+05:30").is_some());
        assert!(parse_kite_timestamp("not a date").is_none());
    }

    #[test]
    fn negative_net_position_normalizes_to_short() {
        let row = KiteHoldingRow {
            tradingsymbol: "INFY".to_string(),
            quantity: -40,
            average_price: 1500.0,
            last_price: 1488.0,
        };
        let h = normalize(&row);
        assert_eq!(h.side, TradeAction::Sell);
        assert_eq!(h.quantity, 40);
    }
}
