use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    Zerodha,
    AngelOne,
}

impl FromStr for BrokerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zerodha" => Ok(BrokerKind::Zerodha),
            "angel_one" => Ok(BrokerKind::AngelOne),
            other => Err(format!("unknown broker '{other}'")),
        }
    }
}

/// All runtime configuration, loaded once from the environment at startup.
/// Secrets never appear anywhere else in the codebase.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,

    pub broker: BrokerKind,
    pub zerodha_api_key: String,
    pub zerodha_api_secret: String,
    pub zerodha_access_token: String,
    pub angel_one_api_key: String,
    pub angel_one_jwt_token: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,

    pub fund_size_inr: f64,
    pub max_risk_per_trade_pct: f64,
    pub max_open_positions: usize,
    pub min_risk_reward: f64,
    pub fund_alert_threshold_inr: f64,
    pub top_n_suggestions: usize,
    pub history_days: u32,
    /// Monitor alerts when the last price is within this fraction of a
    /// pending suggestion's limit entry.
    pub entry_zone_tolerance: f64,

    pub watchlist: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let broker = parse_or("BROKER", BrokerKind::Zerodha)?;
        Ok(Settings {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "swingbot.db".to_string()),
            broker,
            zerodha_api_key: env_or_empty("ZERODHA_API_KEY"),
            zerodha_api_secret: env_or_empty("ZERODHA_API_SECRET"),
            zerodha_access_token: env_or_empty("ZERODHA_ACCESS_TOKEN"),
            angel_one_api_key: env_or_empty("ANGEL_ONE_API_KEY"),
            angel_one_jwt_token: env_or_empty("ANGEL_ONE_JWT_TOKEN"),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: match env::var("TELEGRAM_CHAT_ID") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "TELEGRAM_CHAT_ID",
                    value: raw,
                })?),
                Err(_) => None,
            },
            fund_size_inr: parse_or("FUND_SIZE_INR", 500_000.0)?,
            max_risk_per_trade_pct: parse_or("MAX_RISK_PER_TRADE_PCT", 1.5)?,
            max_open_positions: parse_or("MAX_OPEN_POSITIONS", 5)?,
            min_risk_reward: parse_or("MIN_RISK_REWARD", 2.0)?,
            fund_alert_threshold_inr: parse_or("FUND_ALERT_THRESHOLD_INR", 500.0)?,
            top_n_suggestions: parse_or("TOP_N_SUGGESTIONS", 5)?,
            history_days: parse_or("HISTORY_DAYS", 180)?,
            entry_zone_tolerance: parse_or("ENTRY_ZONE_TOLERANCE", 0.015)?,
            watchlist: watchlist_from_env(),
        })
    }
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn watchlist_from_env() -> Vec<String> {
    match env::var("WATCHLIST") {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
    }
}

/// Nifty 50 plus selected midcaps. Overridable with WATCHLIST=A,B,C.
pub const DEFAULT_WATCHLIST: &[&str] = &[
    "RELIANCE",
    "TCS",
    "HDFCBANK",
    "INFY",
    "ICICIBANK",
    "HINDUNILVR",
    "ITC",
    "SBIN",
    "BHARTIARTL",
    "KOTAKBANK",
    "LT",
    "AXISBANK",
    "ASIANPAINT",
    "MARUTI",
    "TITAN",
    "SUNPHARMA",
    "BAJFINANCE",
    "WIPRO",
    "ULTRACEMCO",
    "NTPC",
    "POWERGRID",
    "ONGC",
    "JSWSTEEL",
    "TATAMOTORS",
    "TECHM",
    "HCLTECH",
    "BAJAJFINSV",
    "GRASIM",
    "ADANIENT",
    "ADANIPORTS",
    "COALINDIA",
    "BRITANNIA",
    "DIVISLAB",
    "DRREDDY",
    "NESTLEIND",
    "CIPLA",
    "EICHERMOT",
    "TATACONSUM",
    "BPCL",
    "SHRIRAMFIN",
    "APOLLOHOSP",
    "HEROMOTOCO",
    "TRENT",
    "INDUSINDBK",
    "HINDALCO",
    "BAJAJ-AUTO",
    "TATASTEEL",
    "M&M",
    "SBILIFE",
    "HDFCLIFE",
    "MUTHOOTFIN",
    "PERSISTENT",
    "COFORGE",
    "LTIM",
    "FEDERALBNK",
    "MARICO",
    "GODREJCP",
    "DABUR",
    "VOLTAS",
    "HAVELLS",
    "POLYCAB",
    "DIXON",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_kind_parses() {
        assert_eq!("zerodha".parse::<BrokerKind>().unwrap(), BrokerKind::Zerodha);
        assert_eq!(
            "angel_one".parse::<BrokerKind>().unwrap(),
            BrokerKind::AngelOne
        );
        assert!("upstox".parse::<BrokerKind>().is_err());
    }
}
