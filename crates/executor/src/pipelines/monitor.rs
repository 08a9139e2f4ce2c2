//! Hourly swing monitor, 09:15–15:15 IST. No tick-chasing: sync the broker,
//! alert on stop/target breaches, and flag pending suggestions whose limit
//! entry is within reach. Positions are never auto-closed here; the user
//! executes in the broker app and the next sync records it.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use storage::repositories::{PositionsRepository, SuggestionsRepository};

use crate::context::AppContext;
use crate::pipelines::{check_exit, notify_sync, record_sync_outcomes};
use crate::services::messages;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();
    info!("Swing monitor at {}", now.format("%H:%M"));

    // Sync always comes first so the exit checks run against the positions
    // the user actually still holds.
    let mut sync_changed = false;
    match ctx.reconcile().await {
        Ok(outcome) => {
            sync_changed = outcome.has_position_changes();
            record_sync_outcomes(ctx, &outcome).await;
            notify_sync(ctx, &outcome).await;
        }
        Err(e) => warn!("Sync skipped this cycle: {e}"),
    }

    let open_positions = PositionsRepository::open(&ctx.pool).await?;
    let start_of_day = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc();
    let pending = SuggestionsRepository::pending_since(&ctx.pool, start_of_day).await?;

    let mut symbols: Vec<String> = open_positions
        .iter()
        .map(|p| p.symbol.clone())
        .chain(pending.iter().map(|s| s.symbol.clone()))
        .collect();
    symbols.sort();
    symbols.dedup();
    if symbols.is_empty() {
        info!("Monitor: nothing open and nothing pending");
        return Ok(());
    }

    let quotes = match ctx.market.quotes(&symbols).await {
        Ok(quotes) => quotes,
        Err(e) => {
            // No new information this cycle; ledger state stands.
            warn!("Failed to get live quotes: {e}");
            return Ok(());
        }
    };

    let mut exit_alerts = 0;
    for position in &open_positions {
        let Some(quote) = quotes.get(&position.symbol) else {
            continue;
        };
        if let Some(alert) = check_exit(position, quote.last_price) {
            ctx.notifier.send(&messages::exit_alert_message(&alert)).await;
            exit_alerts += 1;
        }
    }

    let mut entry_alerts = 0;
    for suggestion in &pending {
        let Some(quote) = quotes.get(&suggestion.symbol) else {
            continue;
        };
        if in_entry_zone(
            quote.last_price,
            suggestion.entry_price,
            ctx.settings.entry_zone_tolerance,
        ) {
            ctx.notifier
                .send(&messages::entry_zone_alert(suggestion, quote.last_price))
                .await;
            entry_alerts += 1;
        }
    }

    info!(
        "Monitor: sync_changes={sync_changed}, exit_alerts={exit_alerts}, \
         entry_zone={entry_alerts}, open={}/{}",
        open_positions.len(),
        ctx.settings.max_open_positions
    );
    Ok(())
}

/// Entry zone is deliberately wide: swing entries are limit orders the user
/// places, not market orders chased tick by tick.
fn in_entry_zone(last_price: f64, entry: f64, tolerance: f64) -> bool {
    entry > 0.0 && ((last_price - entry) / entry).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_zone_is_symmetric() {
        assert!(in_entry_zone(101.4, 100.0, 0.015));
        assert!(in_entry_zone(98.6, 100.0, 0.015));
        assert!(!in_entry_zone(101.6, 100.0, 0.015));
        assert!(!in_entry_zone(98.4, 100.0, 0.015));
    }

    #[test]
    fn degenerate_entry_never_matches() {
        assert!(!in_entry_zone(1.0, 0.0, 0.015));
    }
}
