//! Pre-market pipeline, 07:30 IST. Reconciles the broker account, expires
//! yesterday's unanswered suggestions, screens the watchlist concurrently
//! and sends the morning brief with the sized top setups.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use common::models::{Suggestion, SuggestionInsert};
use storage::repositories::{JournalRepository, PositionsRepository, SuggestionsRepository};
use strategy::screener::{Candidate, ScreenCounters, Screener, ScreenerConfig, SymbolVerdict};
use strategy::sizing::position_size;

use crate::context::AppContext;
use crate::pipelines::{notify_sync, record_sync_outcomes};
use crate::services::messages;

pub async fn run(ctx: &AppContext) -> Result<()> {
    info!("Starting pre-market pipeline");
    let now = Utc::now();
    let today = now.date_naive();

    // Broker first: adopt overnight manual trades before screening so the
    // open-position count and fund balance are current.
    match ctx.reconcile().await {
        Ok(outcome) => {
            record_sync_outcomes(ctx, &outcome).await;
            notify_sync(ctx, &outcome).await;
        }
        Err(e) => warn!("Sync skipped this cycle: {e}"),
    }

    let expired = SuggestionsRepository::expire_stale(&ctx.pool, start_of_day(today)).await?;
    if expired > 0 {
        info!("Expired {expired} stale suggestions from previous days");
    }

    // Weight snapshot is read fresh from the store every run, never cached.
    let weights = Arc::new(learning::calibrator::current_weights(&ctx.pool).await?);
    let screener = Arc::new(Screener::new(ScreenerConfig {
        min_risk_reward: ctx.settings.min_risk_reward,
        top_n: ctx.settings.top_n_suggestions,
    }));

    let (candidates, counters) = screen_watchlist(ctx, &screener, weights).await;
    let found = candidates.len();
    let ranked = screener.rank(candidates);
    screener.log_summary(ctx.settings.watchlist.len(), found, &counters);

    let suggestions = persist_suggestions(ctx, ranked, today).await?;

    ctx.notifier
        .send(&messages::morning_brief(today, &suggestions))
        .await;
    info!("Pre-market done: {} suggestions sent", suggestions.len());
    Ok(())
}

fn start_of_day(date: NaiveDate) -> chrono::DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc()
}

/// Fan the screen out across the watchlist. Evaluations share no mutable
/// state, so one task per symbol; a failed fetch only costs that symbol.
async fn screen_watchlist(
    ctx: &AppContext,
    screener: &Arc<Screener>,
    weights: Arc<HashMap<String, f64>>,
) -> (Vec<Candidate>, ScreenCounters) {
    let mut tasks = JoinSet::new();
    for symbol in ctx.settings.watchlist.clone() {
        let market = ctx.market.clone();
        let screener = screener.clone();
        let weights = weights.clone();
        let lookback = ctx.settings.history_days;
        tasks.spawn(async move {
            match market.daily_bars(&symbol, lookback).await {
                Ok(bars) => Ok(screener.evaluate_symbol(&symbol, &bars, &weights)),
                Err(e) => {
                    debug!("{symbol}: {e}");
                    Err(())
                }
            }
        });
    }

    let mut candidates = Vec::new();
    let mut counters = ScreenCounters::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((verdict, candidate))) => {
                if let Some(c) = candidate {
                    candidates.push(c);
                }
                match verdict {
                    SymbolVerdict::Candidate => {}
                    SymbolVerdict::InsufficientHistory => counters.insufficient += 1,
                    SymbolVerdict::NoSignal => counters.no_signal += 1,
                    SymbolVerdict::ConsensusConflict => counters.consensus_conflicts += 1,
                }
            }
            Ok(Err(())) => counters.fetch_errors += 1,
            Err(e) => {
                warn!("Screen task failed: {e}");
                counters.fetch_errors += 1;
            }
        }
    }
    (candidates, counters)
}

/// Size the ranked candidates against the synced fund balance and record
/// them as pending, staying within the open-position headroom.
async fn persist_suggestions(
    ctx: &AppContext,
    ranked: Vec<Candidate>,
    today: NaiveDate,
) -> Result<Vec<Suggestion>> {
    let open_count = PositionsRepository::count_open(&ctx.pool).await? as usize;
    let headroom = ctx.settings.max_open_positions.saturating_sub(open_count);
    if headroom < ranked.len() {
        info!(
            "{} open positions leave headroom for {headroom} suggestions",
            open_count
        );
    }

    let fund_balance = JournalRepository::latest(&ctx.pool)
        .await?
        .map(|j| j.fund_balance_inr)
        .filter(|balance| *balance > 0.0)
        .unwrap_or(ctx.settings.fund_size_inr);

    let now = Utc::now();
    let mut suggestions = Vec::new();
    for candidate in ranked.into_iter().take(headroom) {
        let quantity = match position_size(
            candidate.entry,
            candidate.stop_loss,
            fund_balance,
            ctx.settings.max_risk_per_trade_pct,
        ) {
            Ok(qty) if qty > 0 => qty,
            Ok(_) => {
                info!("{}: stop too wide for the risk budget, dropped", candidate.symbol);
                continue;
            }
            Err(e) => {
                warn!("{}: {e}", candidate.symbol);
                continue;
            }
        };

        let risk_amount_inr =
            ((candidate.entry - candidate.stop_loss).abs() * quantity as f64 * 100.0).round()
                / 100.0;
        let insert = SuggestionInsert {
            symbol: candidate.symbol.clone(),
            action: candidate.action,
            entry_price: candidate.entry,
            target_price: candidate.target,
            stop_loss: candidate.stop_loss,
            suggested_qty: quantity as i64,
            risk_amount_inr,
            risk_reward: candidate.risk_reward,
            signals_fired: candidate.signals_fired,
            composite_score: candidate.composite_score,
            timeframe: candidate.timeframe,
        };
        let id = SuggestionsRepository::insert(&ctx.pool, &insert, now).await?;
        if let Some(s) = SuggestionsRepository::get(&ctx.pool, id).await? {
            suggestions.push(s);
        }
    }

    if !suggestions.is_empty() {
        let mut conn = ctx.pool.acquire().await?;
        JournalRepository::add_suggestions_sent(&mut conn, today, suggestions.len() as i64)
            .await?;
    }
    Ok(suggestions)
}
