use serde::{Deserialize, Serialize};

use super::signal::TradeAction;

/// One holding as normalized from a broker's portfolio payload.
/// Zero-quantity rows are kept by the adapters when the broker still reports
/// a last price for a just-closed holding; reconciliation uses that price as
/// the exit estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerHolding {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub last_price: f64,
    pub side: TradeAction,
}
