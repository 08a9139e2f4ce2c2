use thiserror::Error;

use crate::models::TradeAction;

/// Broker transport failures. A sync cycle that hits one of these is skipped
/// wholesale; the ledger keeps its prior state and the next scheduled run
/// retries.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    #[error("broker session invalid or expired: {0}")]
    Auth(String),
    #[error("malformed broker response: {0}")]
    BadResponse(String),
}

/// Per-symbol history failures. Not fatal: the screener drops the symbol
/// from the batch and moves on.
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("no usable history for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Error, Debug)]
pub enum SizingError {
    #[error("entry {entry} and stop {stop} leave no risk per share")]
    InvalidStop { entry: f64, stop: f64 },
}

/// The broker reports a holding whose direction contradicts the open ledger
/// position for the same symbol. Surfaced to the user, never auto-resolved.
#[derive(Error, Debug, Clone)]
#[error("{symbol}: broker holds {broker_side} against an open {ledger_side} ledger position")]
pub struct ReconciliationConflict {
    pub symbol: String,
    pub broker_side: TradeAction,
    pub ledger_side: TradeAction,
}
