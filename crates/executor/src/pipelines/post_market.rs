//! Post-market pipeline, 15:35 IST. Settles the day: reconcile once more,
//! close positions that finished through their stop or target at the closing
//! price, feed the outcomes to the learning stats, and send the EOD review.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use common::models::{ExitReason, Position};
use learning::tracker::OutcomeTracker;
use storage::repositories::{JournalRepository, PositionsRepository};

use crate::context::AppContext;
use crate::pipelines::{check_exit, notify_sync, record_sync_outcomes};
use crate::services::messages;

pub async fn run(ctx: &AppContext) -> Result<()> {
    info!("Starting post-market pipeline");
    let now = Utc::now();
    let today = now.date_naive();

    // Trades the user closed in the app during the session land here.
    let mut closed_today: Vec<Position> = Vec::new();
    match ctx.reconcile().await {
        Ok(outcome) => {
            record_sync_outcomes(ctx, &outcome).await;
            notify_sync(ctx, &outcome).await;
            closed_today.extend(outcome.closed.iter().cloned());
        }
        Err(e) => warn!("Sync skipped this cycle: {e}"),
    }

    let open_positions = PositionsRepository::open(&ctx.pool).await?;
    let symbols: Vec<String> = open_positions.iter().map(|p| p.symbol.clone()).collect();
    let quotes = if symbols.is_empty() {
        HashMap::new()
    } else {
        match ctx.market.quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!("Could not fetch closing quotes: {e}");
                HashMap::new()
            }
        }
    };

    // Settle positions whose closing price breached a level the user did not
    // act on during the session.
    for position in &open_positions {
        let Some(quote) = quotes.get(&position.symbol) else {
            continue;
        };
        let Some(alert) = check_exit(position, quote.last_price) else {
            continue;
        };
        let reason = if alert.target_hit {
            ExitReason::TargetHit
        } else {
            ExitReason::StopHit
        };

        let mut conn = ctx.pool.acquire().await?;
        let closed = PositionsRepository::close(
            &mut conn,
            alert.position_id,
            alert.current_price,
            reason,
            now,
        )
        .await?;
        drop(conn);
        if let Some(closed) = closed {
            info!(
                "Settled {} at ₹{:.2} ({reason:?}), P&L ₹{:+.0}",
                closed.symbol,
                quote.last_price,
                closed.pnl_inr.unwrap_or(0.0)
            );
            if let Err(e) = OutcomeTracker::record_close(&ctx.pool, &closed).await {
                error!("Failed to record outcome for {}: {e}", closed.symbol);
            }
            closed_today.push(closed);
        }
    }

    let daily_pnl: f64 = closed_today.iter().filter_map(|p| p.pnl_inr).sum();
    let daily_pnl_pct = if ctx.settings.fund_size_inr > 0.0 {
        daily_pnl / ctx.settings.fund_size_inr * 100.0
    } else {
        0.0
    };
    let still_open = PositionsRepository::open(&ctx.pool).await?;

    let journal = {
        let mut conn = ctx.pool.acquire().await?;
        JournalRepository::update_post_market(
            &mut conn,
            today,
            daily_pnl,
            daily_pnl_pct,
            still_open.len() as i64,
        )
        .await?;
        JournalRepository::get_or_create(&mut conn, today).await?
    };

    ctx.notifier
        .send(&messages::eod_review(
            &closed_today,
            &still_open,
            daily_pnl,
            journal.suggestions_sent,
            journal.suggestions_executed,
        ))
        .await;

    info!(
        "Post-market: closed={}, open={}, pnl=₹{daily_pnl:+.0}",
        closed_today.len(),
        still_open.len()
    );
    Ok(())
}
