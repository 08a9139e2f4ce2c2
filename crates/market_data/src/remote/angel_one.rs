use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::error::{BrokerError, MarketDataError};
use common::models::{Bar, BrokerHolding, Quote, TradeAction};

use super::smartapi_response::{
    value_to_f64, ScripMasterRow, SmartApiCandle, SmartApiEnvelope, SmartApiHoldingRow,
    SmartApiQuoteData, SmartApiRmsData,
};
use crate::traits::{BrokerGateway, MarketDataSource};

const SMARTAPI_BASE_URL: &str = "https://apiconnect.angelbroking.com";
const SCRIP_MASTER_URL: &str =
    "https://margincalculator.angelbroking.com/OpenAPI_File/files/OpenAPIScripMaster.json";

/// Angel One SmartAPI adapter. Session renewal (TOTP login) happens outside
/// this process; the daily JWT arrives via configuration.
pub struct AngelOneClient {
    http: Client,
    base_url: String,
    api_key: String,
    jwt_token: String,
    /// symbol -> instrument token, filled lazily from the scrip master.
    scrips: RwLock<HashMap<String, String>>,
}

impl AngelOneClient {
    pub fn new(api_key: String, jwt_token: String) -> Self {
        Self {
            http: Client::new(),
            base_url: SMARTAPI_BASE_URL.to_string(),
            api_key,
            jwt_token,
            scrips: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.jwt_token))
            .header("X-PrivateKey", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-UserType", "USER")
            .header("X-SourceID", "WEB")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, BrokerError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BrokerError::Auth("JWT rejected".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::BadResponse(format!("{status}: {body}")));
        }

        let envelope: SmartApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?;
        if !envelope.status {
            let message = envelope.message.unwrap_or_else(|| "unknown error".to_string());
            return match envelope.errorcode.as_deref() {
                // AG8001/AB8050: invalid or expired token family.
                Some(code) if code.starts_with("AG8") || code == "AB8050" => {
                    Err(BrokerError::Auth(message))
                }
                _ => Err(BrokerError::BadResponse(message)),
            };
        }
        envelope
            .data
            .ok_or_else(|| BrokerError::BadResponse("empty data payload".to_string()))
    }

    /// NSE equities live in the master as "{SYMBOL}-EQ".
    async fn scrip_token(&self, symbol: &str) -> Result<Option<String>, BrokerError> {
        if let Some(token) = self.scrips.read().await.get(symbol) {
            return Ok(Some(token.clone()));
        }

        let response = self
            .http
            .get(SCRIP_MASTER_URL)
            .send()
            .await
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BrokerError::BadResponse(format!(
                "scrip master: {}",
                response.status()
            )));
        }
        let rows: Vec<ScripMasterRow> = response
            .json()
            .await
            .map_err(|e| BrokerError::BadResponse(e.to_string()))?;

        let mut cache = self.scrips.write().await;
        for row in rows {
            if row.exch_seg == "NSE" {
                if let Some(bare) = row.symbol.strip_suffix("-EQ") {
                    cache.insert(bare.to_string(), row.token);
                }
            }
        }
        info!("Loaded {} NSE equities from Angel One scrip master", cache.len());
        Ok(cache.get(symbol).cloned())
    }
}

fn normalize(row: &SmartApiHoldingRow) -> Option<BrokerHolding> {
    if row.tradingsymbol.is_empty() {
        return None;
    }
    // Holdings carry `quantity`; positions carry `netqty`.
    let qty_value = value_to_f64(&row.quantity);
    let qty = if qty_value != 0.0 {
        qty_value
    } else {
        value_to_f64(&row.netqty)
    };
    let side = if qty < 0.0 {
        TradeAction::Sell
    } else {
        TradeAction::Buy
    };
    let symbol = row
        .tradingsymbol
        .strip_suffix("-EQ")
        .unwrap_or(&row.tradingsymbol)
        .to_string();
    Some(BrokerHolding {
        symbol,
        quantity: qty.abs() as i64,
        avg_price: value_to_f64(&row.averageprice),
        last_price: value_to_f64(&row.ltp),
        side,
    })
}

#[async_trait]
impl BrokerGateway for AngelOneClient {
    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerError> {
        let holdings: Vec<SmartApiHoldingRow> = self
            .send_json(self.request(
                reqwest::Method::GET,
                "/rest/secure/angelbroking/portfolio/v1/getHolding",
            ))
            .await?;
        let positions: Vec<SmartApiHoldingRow> = self
            .send_json(self.request(
                reqwest::Method::GET,
                "/rest/secure/angelbroking/order/v1/getPosition",
            ))
            .await?;

        let mut merged: BTreeMap<String, BrokerHolding> = BTreeMap::new();
        for row in holdings.iter().chain(positions.iter()) {
            if let Some(h) = normalize(row) {
                merged.insert(h.symbol.clone(), h);
            }
        }
        Ok(merged.into_values().collect())
    }

    async fn cash_balance(&self) -> Result<f64, BrokerError> {
        let rms: SmartApiRmsData = self
            .send_json(self.request(
                reqwest::Method::GET,
                "/rest/secure/angelbroking/user/v1/getRMS",
            ))
            .await?;
        Ok(value_to_f64(&rms.net))
    }
}

#[async_trait]
impl MarketDataSource for AngelOneClient {
    async fn daily_bars(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let token = self
            .scrip_token(symbol)
            .await?
            .ok_or_else(|| MarketDataError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "not in scrip master".to_string(),
            })?;

        let to = Utc::now();
        let from = to - Duration::days(i64::from(lookback_days));
        let body = json!({
            "exchange": "NSE",
            "symboltoken": token,
            "interval": "ONE_DAY",
            "fromdate": from.format("%Y-%m-%d %H:%M").to_string(),
            "todate": to.format("%Y-%m-%d %H:%M").to_string(),
        });

        let candles: Vec<SmartApiCandle> = self
            .send_json(
                self.request(
                    reqwest::Method::POST,
                    "/rest/secure/angelbroking/historical/v1/getCandleData",
                )
                .json(&body),
            )
            .await?;

        let mut bars = Vec::with_capacity(candles.len());
        for candle in &candles {
            match parse_smartapi_timestamp(&candle.0) {
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
        let mut tokens = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.scrip_token(symbol).await? {
                Some(token) => tokens.push(token),
                None => warn!("{symbol}: not in scrip master, no quote"),
            }
        }

        let body = json!({
            "mode": "FULL",
            "exchangeTokens": { "NSE": tokens },
        });
        let data: SmartApiQuoteData = self
            .send_json(
                self.request(
                    reqwest::Method::POST,
                    "/rest/secure/angelbroking/market/v1/quote/",
                )
                .json(&body),
            )
            .await?;

        let now = Utc::now();
        let quotes = data
            .fetched
            .into_iter()
            .map(|row| {
                let symbol = row
                    .trading_symbol
                    .strip_suffix("-EQ")
                    .unwrap_or(&row.trading_symbol)
                    .to_string();
                (
                    symbol.clone(),
                    Quote {
                        symbol,
                        last_price: row.ltp,
                        open: row.open,
                        high: row.high,
                        low: row.low,
                        close: row.close,
                        volume: row.trade_volume,
                        ts: now,
                    },
                )
            })
            .collect();
        Ok(quotes)
    }
}

/// SmartAPI candle timestamps: "2024-01-15T09:15:00+05:30" or the
/// offset-less "2024-01-15 09:15"; the latter is IST wall-clock.
fn parse_smartapi_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    let ist = chrono::FixedOffset::east_opt(5 * 3600 + 1800)?;
    Some(ist.from_local_datetime(&naive).single()?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn holding_row_with_string_numbers_normalizes() {
        let row = SmartApiHoldingRow {
            tradingsymbol: "RELIANCE-EQ".to_string(),
            quantity: json!("10"),
            netqty: json!(null),
            averageprice: json!("2500.50"),
            ltp: json!(2510.0),
        };
        let h = normalize(&row).unwrap();
        assert_eq!(h.symbol, "RELIANCE");
        assert_eq!(h.quantity, 10);
        assert!((h.avg_price - 2500.50).abs() < 1e-9);
        assert_eq!(h.side, TradeAction::Buy);
    }

    #[test]
    fn position_row_uses_netqty() {
        let row = SmartApiHoldingRow {
            tradingsymbol: "INFY-EQ".to_string(),
            quantity: json!(0),
            netqty: json!("-25"),
            averageprice: json!(1500),
            ltp: json!(1492.5),
        };
        let h = normalize(&row).unwrap();
        assert_eq!(h.quantity, 25);
        assert_eq!(h.side, TradeAction::Sell);
    }

    #[test]
    fn timestamps_parse_in_both_shapes() {
        assert!(parse_smartapi_timestamp("2024-01-15T09:15:00+05:30").is_some());
        assert!(parse_smartapi_timestamp("2024-01-15 09:15").is_some());
        assert!(parse_smartapi_timestamp("nope").is_none());
    }
}
