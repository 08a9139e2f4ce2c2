//! The three cron-driven runs. Each subcommand performs one pass and exits;
//! scheduling lives outside the process.

pub mod monitor;
pub mod post_market;
pub mod pre_market;

use tracing::error;

use common::models::{Position, TradeAction};
use learning::tracker::OutcomeTracker;
use market_data::sync::SyncOutcome;

use crate::context::AppContext;
use crate::services::messages;

/// A position trading through its stop or target. Alert-only: the user
/// closes in the broker app and the next sync records the exit.
#[derive(Debug, Clone)]
pub struct ExitAlert {
    pub position_id: i64,
    pub symbol: String,
    pub action: TradeAction,
    pub current_price: f64,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
    pub target_hit: bool,
}

/// Stop/target breach check against the latest traded price. Target wins
/// when a wide candle crosses both levels.
pub(crate) fn check_exit(position: &Position, last_price: f64) -> Option<ExitAlert> {
    let (hit_target, hit_stop) = match position.action {
        TradeAction::Buy => (
            last_price >= position.target,
            last_price <= position.current_stop,
        ),
        TradeAction::Sell => (
            last_price <= position.target,
            last_price >= position.current_stop,
        ),
    };
    if !hit_target && !hit_stop {
        return None;
    }
    Some(ExitAlert {
        position_id: position.id,
        symbol: position.symbol.clone(),
        action: position.action,
        current_price: last_price,
        entry_price: position.entry_price,
        stop: position.current_stop,
        target: position.target,
        target_hit: hit_target,
    })
}

/// Feed sync-detected closes into the learning stats. Runs after the sync
/// transaction commits; a failed attribution never fails the pipeline.
pub(crate) async fn record_sync_outcomes(ctx: &AppContext, outcome: &SyncOutcome) {
    for position in &outcome.closed {
        if let Err(e) = OutcomeTracker::record_close(&ctx.pool, position).await {
            error!("Failed to record outcome for {}: {e}", position.symbol);
        }
    }
}

/// Tell the user what the sync changed: adopted/closed positions, conflicts,
/// drift, fund movements. Quiet when nothing happened.
pub(crate) async fn notify_sync(ctx: &AppContext, outcome: &SyncOutcome) {
    if outcome.has_position_changes()
        || !outcome.conflicts.is_empty()
        || !outcome.quantity_drift.is_empty()
    {
        ctx.notifier
            .send(&messages::sync_changes_message(outcome))
            .await;
    }
    if outcome.fund_alert {
        ctx.notifier.send(&messages::fund_change_message(outcome)).await;
    }
}
