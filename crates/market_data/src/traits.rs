use std::collections::HashMap;

use async_trait::async_trait;

use common::error::{BrokerError, MarketDataError};
use common::models::{Bar, BrokerHolding, Quote};

/// Daily history and live quotes. The only suspension point in a screen run;
/// everything downstream of the fetch is pure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Ascending daily bars covering the last `lookback_days` calendar days.
    async fn daily_bars(&self, symbol: &str, lookback_days: u32)
        -> Result<Vec<Bar>, MarketDataError>;

    async fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, MarketDataError>;
}

/// Read-only account state. Brokers are a capability set, not a hierarchy:
/// any adapter that can report holdings and free cash plugs in here.
/// Authentication and session renewal are entirely the adapter's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Current holdings and open delivery positions, normalized. Adapters
    /// may include zero-quantity rows for just-closed holdings; their last
    /// price feeds the reconciliation exit estimate.
    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerError>;

    /// Free cash / available margin in INR.
    async fn cash_balance(&self) -> Result<f64, BrokerError>;
}
