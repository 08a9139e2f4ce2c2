use chrono::{DateTime, Utc};

use super::signal::Timeframe;

/// Rolling per-signal statistics, one row per (signal_name, timeframe).
/// The tracker updates the counters and running means on every close; the
/// calibrator adjusts `signal_weight` weekly within [0.1, 2.0].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalPerformance {
    pub id: i64,
    pub signal_name: String,
    pub timeframe: Timeframe,
    /// Every time the signal contributed to a suggestion, executed or not.
    pub total_signals: i64,
    /// How many of those the user actually traded.
    pub executed_signals: i64,
    pub winning_trades: i64,
    pub win_rate: f64,
    pub avg_pnl_pct: f64,
    pub avg_risk_reward: f64,
    pub avg_held_days: f64,
    pub signal_weight: f64,
    pub last_calibrated: Option<DateTime<Utc>>,
}

impl SignalPerformance {
    pub const MIN_WEIGHT: f64 = 0.1;
    pub const MAX_WEIGHT: f64 = 2.0;
    pub const DEFAULT_WEIGHT: f64 = 1.0;
}
