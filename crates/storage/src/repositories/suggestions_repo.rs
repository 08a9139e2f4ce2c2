use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Sqlite};

use common::models::{Suggestion, SuggestionInsert, SuggestionStatus};

pub struct SuggestionsRepository;

impl SuggestionsRepository {
    pub async fn insert<'e, E>(
        ex: E,
        s: &SuggestionInsert,
        created_at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
                INSERT INTO suggestions (
                    created_at, symbol, action, entry_price, target_price,
                    stop_loss, suggested_qty, risk_amount_inr, risk_reward,
                    signals_fired, composite_score, timeframe, status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(created_at)
        .bind(&s.symbol)
        .bind(s.action)
        .bind(s.entry_price)
        .bind(s.target_price)
        .bind(s.stop_loss)
        .bind(s.suggested_qty)
        .bind(s.risk_amount_inr)
        .bind(s.risk_reward)
        .bind(Json(&s.signals_fired))
        .bind(s.composite_score)
        .bind(s.timeframe)
        .execute(ex)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get<'e, E>(ex: E, id: i64) -> Result<Option<Suggestion>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Suggestion>("SELECT * FROM suggestions WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await
    }

    pub async fn pending<'e, E>(ex: E) -> Result<Vec<Suggestion>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Suggestion>(
            "SELECT * FROM suggestions WHERE status = 'pending' ORDER BY composite_score DESC",
        )
        .fetch_all(ex)
        .await
    }

    /// Pending suggestions created at or after `since`, used by the monitor
    /// to avoid re-suggesting a symbol already sent today.
    pub async fn pending_since<'e, E>(
        ex: E,
        since: DateTime<Utc>,
    ) -> Result<Vec<Suggestion>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Suggestion>(
            "SELECT * FROM suggestions WHERE status = 'pending' AND created_at >= ? \
             ORDER BY composite_score DESC",
        )
        .bind(since)
        .fetch_all(ex)
        .await
    }

    pub async fn set_status<'e, E>(
        ex: E,
        id: i64,
        status: SuggestionStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE suggestions SET status = ?, responded_at = ? WHERE id = ?")
            .bind(status)
            .bind(responded_at)
            .bind(id)
            .execute(ex)
            .await?;
        Ok(())
    }

    /// Expire pending suggestions created before `cutoff` (start of today).
    /// Returns how many rows were expired.
    pub async fn expire_stale<'e, E>(
        ex: E,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE suggestions SET status = 'expired' \
             WHERE status = 'pending' AND created_at < ?",
        )
        .bind(cutoff)
        .execute(ex)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::Duration;
    use common::models::{SignalCall, SignalKind, Timeframe, TradeAction};

    fn sample_insert(symbol: &str) -> SuggestionInsert {
        SuggestionInsert {
            symbol: symbol.to_string(),
            action: TradeAction::Buy,
            entry_price: 100.0,
            target_price: 112.0,
            stop_loss: 96.0,
            suggested_qty: 1250,
            risk_amount_inr: 7500.0,
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

    #[tokio::test]
    async fn insert_and_fetch_pending() {
        let pool = connect_in_memory().await.unwrap();
        let id = SuggestionsRepository::insert(&pool, &sample_insert("RELIANCE"), Utc::now())
            .await
            .unwrap();

        let pending = SuggestionsRepository::pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].symbol, "RELIANCE");
        assert_eq!(pending[0].status, SuggestionStatus::Pending);
        assert_eq!(pending[0].signals_fired.0.len(), 1);
        assert_eq!(pending[0].signals_fired.0[0].signal, SignalKind::EmaCrossover);
    }

    #[tokio::test]
    async fn status_transitions_are_persisted() {
        let pool = connect_in_memory().await.unwrap();
        let id = SuggestionsRepository::insert(&pool, &sample_insert("TCS"), Utc::now())
            .await
            .unwrap();

        SuggestionsRepository::set_status(&pool, id, SuggestionStatus::Executed, Utc::now())
            .await
            .unwrap();

        let s = SuggestionsRepository::get(&pool, id).await.unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Executed);
        assert!(s.responded_at.is_some());
        assert!(SuggestionsRepository::pending(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expire_stale_only_touches_older_pending() {
        let pool = connect_in_memory().await.unwrap();
        let yesterday = Utc::now() - Duration::days(1);
        SuggestionsRepository::insert(&pool, &sample_insert("INFY"), yesterday)
            .await
            .unwrap();
        let fresh_id = SuggestionsRepository::insert(&pool, &sample_insert("SBIN"), Utc::now())
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::hours(12);
        let expired = SuggestionsRepository::expire_stale(&pool, cutoff).await.unwrap();
        assert_eq!(expired, 1);

        let pending = SuggestionsRepository::pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh_id);
    }
}
