use sqlx::SqlitePool;
use tracing::{debug, error};

use common::models::{Position, Suggestion};
use storage::repositories::{PerformanceRepository, SuggestionsRepository};

/// Attributes each closed trade's outcome to the signals that proposed it.
pub struct OutcomeTracker;

impl OutcomeTracker {
    /// Called exactly once per position close. Externally created positions
    /// have no origin suggestion and contribute no learning signal; that is
    /// a no-op, not an error. A failure on one signal row never blocks the
    /// others.
    pub async fn record_close(pool: &SqlitePool, position: &Position) -> Result<(), sqlx::Error> {
        let Some(suggestion_id) = position.suggestion_id else {
            return Ok(());
        };
        let Some(suggestion) = SuggestionsRepository::get(pool, suggestion_id).await? else {
            return Ok(());
        };
        if suggestion.signals_fired.0.is_empty() {
            return Ok(());
        }

        let pnl_pct = position.pnl_pct.unwrap_or(0.0);
        let held_days = position.held_days.unwrap_or(0);

        // Realized R:R: how much of the planned risk the exit actually paid.
        let risk = (suggestion.entry_price - suggestion.stop_loss).abs();
        let realized = (position.exit_price.unwrap_or(suggestion.entry_price)
            - suggestion.entry_price)
            .abs();
        let actual_rr = if risk > 0.0 { realized / risk } else { 0.0 };

        let mut conn = pool.acquire().await?;
        for call in suggestion.signals_fired.0.iter() {
            match PerformanceRepository::record_outcome(
                &mut conn,
                call.signal.name(),
                call.timeframe,
                pnl_pct,
                actual_rr,
                held_days,
            )
            .await
            {
                Ok(_) => debug!(
                    "Recorded outcome for {}: P&L {:+.1}%, R:R {:.2}, held {}d",
                    call.signal, pnl_pct, actual_rr, held_days
                ),
                Err(e) => error!("Failed to record outcome for {}: {e}", call.signal),
            }
        }
        Ok(())
    }

    /// A skipped suggestion still counts against each contributing signal's
    /// fired total, keeping the execution-rate denominator honest.
    pub async fn record_skipped(
        pool: &SqlitePool,
        suggestion: &Suggestion,
    ) -> Result<(), sqlx::Error> {
        let mut conn = pool.acquire().await?;
        for call in suggestion.signals_fired.0.iter() {
            if let Err(e) =
                PerformanceRepository::record_skipped(&mut conn, call.signal.name(), call.timeframe)
                    .await
            {
                error!("Failed to record skip for {}: {e}", call.signal);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::models::{
        ExitReason, PositionInsert, SignalCall, SignalKind, SuggestionInsert, SuggestionStatus,
        Timeframe, TradeAction,
    };
    use storage::db::connect_in_memory;
    use storage::repositories::{JournalRepository, PositionsRepository};

    fn call(signal: SignalKind, strength: f64) -> SignalCall {
        SignalCall {
            signal,
            action: TradeAction::Buy,
            strength,
            entry: 100.0,
            target: 112.0,
            stop_loss: 96.0,
            timeframe: Timeframe::Daily,
        }
    }

    fn suggestion_insert(signals: Vec<SignalCall>) -> SuggestionInsert {
        SuggestionInsert {
            symbol: "RELIANCE".to_string(),
            action: TradeAction::Buy,
            entry_price: 100.0,
            target_price: 112.0,
            stop_loss: 96.0,
            suggested_qty: 100,
            risk_amount_inr: 400.0,
            risk_reward: 3.0,
            signals_fired: signals,
            composite_score: 0.7,
            timeframe: Timeframe::Daily,
        }
    }

    async fn close_executed_suggestion(
        pool: &SqlitePool,
        suggestion_id: i64,
        exit_price: f64,
    ) -> Position {
        let pos_id = PositionsRepository::insert(
            pool,
            &PositionInsert {
                suggestion_id: Some(suggestion_id),
                symbol: "RELIANCE".to_string(),
                action: TradeAction::Buy,
                entry_price: 100.0,
                quantity: 100,
                current_stop: 96.0,
                target: 112.0,
                is_externally_created: false,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        PositionsRepository::close(&mut conn, pos_id, exit_price, ExitReason::TargetHit, Utc::now())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn close_attributes_outcome_to_every_contributing_signal() {
        let pool = connect_in_memory().await.unwrap();
        let id = SuggestionsRepository::insert(
            &pool,
            &suggestion_insert(vec![
                call(SignalKind::EmaCrossover, 0.8),
                call(SignalKind::VolumeBreakout, 0.6),
            ]),
            Utc::now(),
        )
        .await
        .unwrap();
        SuggestionsRepository::set_status(&pool, id, SuggestionStatus::Executed, Utc::now())
            .await
            .unwrap();

        let closed = close_executed_suggestion(&pool, id, 112.0).await;
        OutcomeTracker::record_close(&pool, &closed).await.unwrap();

        let all = PerformanceRepository::all(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
        for sp in &all {
            assert_eq!(sp.executed_signals, 1);
            assert_eq!(sp.winning_trades, 1);
            assert!((sp.avg_pnl_pct - 12.0).abs() < 1e-9);
            // Realized 12 over planned risk 4.
            assert!((sp.avg_risk_reward - 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn external_position_is_a_learning_no_op() {
        let pool = connect_in_memory().await.unwrap();
        let pos_id = PositionsRepository::insert(
            &pool,
            &PositionInsert {
                suggestion_id: None,
                symbol: "TCS".to_string(),
                action: TradeAction::Buy,
                entry_price: 3500.0,
                quantity: 5,
                current_stop: 3290.0,
                target: 3850.0,
                is_externally_created: true,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let closed =
            PositionsRepository::close(&mut conn, pos_id, 3600.0, ExitReason::Manual, Utc::now())
                .await
                .unwrap()
                .unwrap();
        drop(conn);

        OutcomeTracker::record_close(&pool, &closed).await.unwrap();
        assert!(PerformanceRepository::all(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_counts_toward_fired_totals_only() {
        let pool = connect_in_memory().await.unwrap();
        let id = SuggestionsRepository::insert(
            &pool,
            &suggestion_insert(vec![call(SignalKind::RsiDivergence, 0.5)]),
            Utc::now(),
        )
        .await
        .unwrap();
        let suggestion = SuggestionsRepository::get(&pool, id).await.unwrap().unwrap();

        OutcomeTracker::record_skipped(&pool, &suggestion).await.unwrap();

        let all = PerformanceRepository::all(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_signals, 1);
        assert_eq!(all[0].executed_signals, 0);
        assert_eq!(all[0].win_rate, 0.0);
    }

    #[tokio::test]
    async fn journal_is_untouched_by_learning_writes() {
        // Tracker writes serialize against calibrator writes on the same
        // rows, but never interleave with reconciliation state.
        let pool = connect_in_memory().await.unwrap();
        let id = SuggestionsRepository::insert(
            &pool,
            &suggestion_insert(vec![call(SignalKind::EmaCrossover, 0.8)]),
            Utc::now(),
        )
        .await
        .unwrap();
        let closed = close_executed_suggestion(&pool, id, 112.0).await;
        OutcomeTracker::record_close(&pool, &closed).await.unwrap();

        assert!(JournalRepository::latest(&pool).await.unwrap().is_none());
    }
}
