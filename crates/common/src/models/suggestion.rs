use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use super::signal::{SignalCall, Timeframe, TradeAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SuggestionStatus {
    /// Sent to the user, awaiting a response.
    Pending,
    /// User confirmed they placed the order.
    Executed,
    /// User passed on this one.
    Skipped,
    /// Superseded by a later screen; never acted on.
    Expired,
}

/// A ranked trade setup proposed to the user. Immutable once executed into a
/// position.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Suggestion {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub suggested_qty: i64,
    pub risk_amount_inr: f64,
    pub risk_reward: f64,
    pub signals_fired: Json<Vec<SignalCall>>,
    pub composite_score: f64,
    pub timeframe: Timeframe,
    pub status: SuggestionStatus,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SuggestionInsert {
    pub symbol: String,
    pub action: TradeAction,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub suggested_qty: i64,
    pub risk_amount_inr: f64,
    pub risk_reward: f64,
    pub signals_fired: Vec<SignalCall>,
    pub composite_score: f64,
    pub timeframe: Timeframe,
}
