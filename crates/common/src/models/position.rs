use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExitReason {
    TargetHit,
    StopHit,
    /// User closed directly in the broker app (or via sync detection).
    Manual,
}

/// A live or completed trade in the ledger. OPEN -> CLOSED, terminal.
/// At most one open position per symbol at any time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Position {
    pub id: i64,
    /// Null for positions the sync detected in the broker account.
    pub suggestion_id: Option<i64>,
    pub symbol: String,
    pub action: TradeAction,
    pub entry_price: f64,
    pub entry_date: DateTime<Utc>,
    pub quantity: i64,
    pub current_stop: f64,
    pub target: f64,
    pub exit_price: Option<f64>,
    pub exit_date: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl_inr: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub held_days: Option<i64>,
    pub status: PositionStatus,
    pub is_externally_created: bool,
}

#[derive(Debug, Clone)]
pub struct PositionInsert {
    pub suggestion_id: Option<i64>,
    pub symbol: String,
    pub action: TradeAction,
    pub entry_price: f64,
    pub quantity: i64,
    pub current_stop: f64,
    pub target: f64,
    pub is_externally_created: bool,
}
