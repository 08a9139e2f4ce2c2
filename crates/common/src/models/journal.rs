use chrono::{DateTime, NaiveDate, Utc};

/// One row per trading day. Fund fields are maintained by the sync engine;
/// the suggestion counters by the pipelines; the P&L totals post-market.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyJournal {
    pub id: i64,
    pub date: NaiveDate,
    pub suggestions_sent: i64,
    pub suggestions_executed: i64,
    pub suggestions_skipped: i64,
    /// Available margin at the last broker sync.
    pub fund_balance_inr: f64,
    /// Net funds added today (withdrawals are alerted but not netted here).
    pub fund_added_inr: f64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub total_pnl_inr: Option<f64>,
    pub total_pnl_pct: Option<f64>,
    pub open_positions_count: i64,
}
