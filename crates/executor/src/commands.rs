//! User-confirmation boundary. A suggestion becomes a ledger position only
//! through `execute`, inside one transaction, and only while the symbol has
//! no open position and the open-position cap has headroom.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use common::models::{Position, PositionInsert, Suggestion, SuggestionStatus};
use learning::tracker::OutcomeTracker;
use storage::repositories::{JournalRepository, PositionsRepository, SuggestionsRepository};

use crate::context::AppContext;

pub async fn execute(ctx: &AppContext, suggestion_id: i64) -> Result<()> {
    let position = open_from_suggestion(
        &ctx.pool,
        suggestion_id,
        ctx.settings.max_open_positions,
    )
    .await?;

    info!(
        "Position #{} opened: {} {} ×{} @ ₹{:.2}",
        position.id, position.action, position.symbol, position.quantity, position.entry_price
    );
    ctx.notifier
        .send(&format!(
            "✅ Position #{} opened: {} {} @ ₹{:.2} | SL ₹{:.2} | Target ₹{:.2}\n\
             You'll be alerted when price hits target or stop.",
            position.id,
            position.symbol,
            position.action,
            position.entry_price,
            position.current_stop,
            position.target,
        ))
        .await;
    Ok(())
}

pub async fn skip(ctx: &AppContext, suggestion_id: i64) -> Result<()> {
    let suggestion = mark_skipped(&ctx.pool, suggestion_id).await?;
    OutcomeTracker::record_skipped(&ctx.pool, &suggestion).await?;
    info!("Suggestion #{} ({}) skipped", suggestion.id, suggestion.symbol);
    Ok(())
}

pub async fn positions(ctx: &AppContext) -> Result<()> {
    let open = PositionsRepository::open(&ctx.pool).await?;
    if open.is_empty() {
        println!("No open positions.");
        return Ok(());
    }
    println!("{} open position(s):", open.len());
    for p in &open {
        let origin = if p.is_externally_created {
            "external"
        } else {
            "suggested"
        };
        println!(
            "  #{} {} {} ×{} @ ₹{:.2}  SL ₹{:.2}  Target ₹{:.2}  [{origin}]",
            p.id, p.action, p.symbol, p.quantity, p.entry_price, p.current_stop, p.target
        );
    }
    Ok(())
}

/// Mark the suggestion executed and open its position atomically. Rejections
/// leave both tables untouched.
async fn open_from_suggestion(
    pool: &SqlitePool,
    suggestion_id: i64,
    max_open_positions: usize,
) -> Result<Position> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let Some(suggestion) = SuggestionsRepository::get(&mut *tx, suggestion_id).await? else {
        bail!("suggestion #{suggestion_id} not found");
    };
    if suggestion.status != SuggestionStatus::Pending {
        bail!(
            "suggestion #{suggestion_id} was already {:?}",
            suggestion.status
        );
    }
    if PositionsRepository::open_by_symbol(&mut *tx, &suggestion.symbol)
        .await?
        .is_some()
    {
        bail!("an open position for {} already exists", suggestion.symbol);
    }
    let open_count = PositionsRepository::count_open(&mut *tx).await?;
    if open_count as usize >= max_open_positions {
        bail!("already at the maximum of {max_open_positions} open positions");
    }

    SuggestionsRepository::set_status(&mut *tx, suggestion_id, SuggestionStatus::Executed, now)
        .await?;
    let position_id = PositionsRepository::insert(
        &mut *tx,
        &PositionInsert {
            suggestion_id: Some(suggestion.id),
            symbol: suggestion.symbol.clone(),
            action: suggestion.action,
            entry_price: suggestion.entry_price,
            quantity: suggestion.suggested_qty,
            current_stop: suggestion.stop_loss,
            target: suggestion.target_price,
            is_externally_created: false,
        },
        now,
    )
    .await?;
    JournalRepository::record_response(&mut *tx, now.date_naive(), true).await?;

    let Some(position) = PositionsRepository::get(&mut *tx, position_id).await? else {
        bail!("position #{position_id} vanished mid-transaction");
    };
    tx.commit().await?;
    Ok(position)
}

async fn mark_skipped(pool: &SqlitePool, suggestion_id: i64) -> Result<Suggestion> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let Some(suggestion) = SuggestionsRepository::get(&mut *tx, suggestion_id).await? else {
        bail!("suggestion #{suggestion_id} not found");
    };
    if suggestion.status != SuggestionStatus::Pending {
        bail!(
            "suggestion #{suggestion_id} was already {:?}",
            suggestion.status
        );
    }

    SuggestionsRepository::set_status(&mut *tx, suggestion_id, SuggestionStatus::Skipped, now)
        .await?;
    JournalRepository::record_response(&mut *tx, now.date_naive(), false).await?;
    tx.commit().await?;
    Ok(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{
        PositionStatus, SignalCall, SignalKind, SuggestionInsert, Timeframe, TradeAction,
    };
    use storage::db::connect_in_memory;
    use storage::repositories::PerformanceRepository;

    fn insert_for(symbol: &str) -> SuggestionInsert {
        SuggestionInsert {
            symbol: symbol.to_string(),
            action: TradeAction::Buy,
            entry_price: 100.0,
            target_price: 112.0,
            stop_loss: 96.0,
            suggested_qty: 100,
            risk_amount_inr: 400.0,
            risk_reward: 3.0,
            signals_fired: vec![SignalCall {
                signal: SignalKind::EmaCrossover,
                action: TradeAction::Buy,
                strength: 0.8,
                entry: 100.0,
                target: 112.0,
                stop_loss: 96.0,
                timeframe: Timeframe::Daily,
            }],
            composite_score: 0.8,
            timeframe: Timeframe::Daily,
        }
    }

    async fn seed(pool: &SqlitePool, symbol: &str) -> i64 {
        SuggestionsRepository::insert(pool, &insert_for(symbol), Utc::now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn execute_opens_position_and_marks_suggestion() {
        let pool = connect_in_memory().await.unwrap();
        let id = seed(&pool, "RELIANCE").await;

        let position = open_from_suggestion(&pool, id, 5).await.unwrap();
        assert_eq!(position.suggestion_id, Some(id));
        assert_eq!(position.status, PositionStatus::Open);
        assert!(!position.is_externally_created);
        assert_eq!(position.quantity, 100);

        let s = SuggestionsRepository::get(&pool, id).await.unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Executed);

        let journal = JournalRepository::latest(&pool).await.unwrap().unwrap();
        assert_eq!(journal.suggestions_executed, 1);
    }

    #[tokio::test]
    async fn execute_rejects_non_pending_suggestion() {
        let pool = connect_in_memory().await.unwrap();
        let id = seed(&pool, "RELIANCE").await;

        open_from_suggestion(&pool, id, 5).await.unwrap();
        let err = open_from_suggestion(&pool, id, 5).await.unwrap_err();
        assert!(err.to_string().contains("already"));
    }

    #[tokio::test]
    async fn one_open_position_per_symbol_is_enforced() {
        let pool = connect_in_memory().await.unwrap();
        let first = seed(&pool, "TCS").await;
        let second = seed(&pool, "TCS").await;

        open_from_suggestion(&pool, first, 5).await.unwrap();
        let err = open_from_suggestion(&pool, second, 5).await.unwrap_err();
        assert!(err.to_string().contains("open position for TCS"));

        // The rejected suggestion is still pending and no position leaked.
        let s = SuggestionsRepository::get(&pool, second).await.unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Pending);
        assert_eq!(PositionsRepository::count_open(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn position_cap_is_enforced() {
        let pool = connect_in_memory().await.unwrap();
        let a = seed(&pool, "INFY").await;
        let b = seed(&pool, "SBIN").await;
        let c = seed(&pool, "WIPRO").await;

        open_from_suggestion(&pool, a, 2).await.unwrap();
        open_from_suggestion(&pool, b, 2).await.unwrap();
        let err = open_from_suggestion(&pool, c, 2).await.unwrap_err();
        assert!(err.to_string().contains("maximum"));
        assert_eq!(PositionsRepository::count_open(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn skip_records_learning_denominator() {
        let pool = connect_in_memory().await.unwrap();
        let id = seed(&pool, "TITAN").await;

        let suggestion = mark_skipped(&pool, id).await.unwrap();
        OutcomeTracker::record_skipped(&pool, &suggestion).await.unwrap();

        let s = SuggestionsRepository::get(&pool, id).await.unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Skipped);

        let stats = PerformanceRepository::all(&pool).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_signals, 1);
        assert_eq!(stats[0].executed_signals, 0);

        let journal = JournalRepository::latest(&pool).await.unwrap().unwrap();
        assert_eq!(journal.suggestions_skipped, 1);
    }
}
