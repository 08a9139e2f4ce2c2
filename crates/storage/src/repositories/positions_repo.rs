use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

use common::models::{ExitReason, Position, PositionInsert};

pub struct PositionsRepository;

impl PositionsRepository {
    pub async fn insert<'e, E>(
        ex: E,
        p: &PositionInsert,
        entry_date: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
                INSERT INTO positions (
                    suggestion_id, symbol, action, entry_price, entry_date,
                    quantity, current_stop, target, status, is_externally_created
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', ?)
            "#,
        )
        .bind(p.suggestion_id)
        .bind(&p.symbol)
        .bind(p.action)
        .bind(p.entry_price)
        .bind(entry_date)
        .bind(p.quantity)
        .bind(p.current_stop)
        .bind(p.target)
        .bind(p.is_externally_created)
        .execute(ex)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get<'e, E>(ex: E, id: i64) -> Result<Option<Position>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await
    }

    pub async fn open<'e, E>(ex: E) -> Result<Vec<Position>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE status = 'open' ORDER BY symbol",
        )
        .fetch_all(ex)
        .await
    }

    pub async fn open_by_symbol<'e, E>(
        ex: E,
        symbol: &str,
    ) -> Result<Option<Position>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE status = 'open' AND symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(ex)
        .await
    }

    pub async fn count_open<'e, E>(ex: E) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE status = 'open'")
            .fetch_one(ex)
            .await
    }

    pub async fn update_stop<'e, E>(ex: E, id: i64, new_stop: f64) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE positions SET current_stop = ? WHERE id = ?")
            .bind(new_stop)
            .bind(id)
            .execute(ex)
            .await?;
        Ok(())
    }

    /// Close a position and record realized P&L. Longs gain when the exit is
    /// above entry, shorts when below. Returns the updated row, or None when
    /// the id is unknown.
    pub async fn close(
        conn: &mut SqliteConnection,
        id: i64,
        exit_price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<Option<Position>, sqlx::Error> {
        let Some(pos) = Self::get(&mut *conn, id).await? else {
            return Ok(None);
        };

        let pnl_inr = (exit_price - pos.entry_price) * pos.quantity as f64 * pos.action.sign();
        let invested = pos.entry_price * pos.quantity as f64;
        let pnl_pct = if invested > 0.0 {
            pnl_inr / invested * 100.0
        } else {
            0.0
        };
        let held_days = (now - pos.entry_date).num_days();

        sqlx::query(
            r#"
                UPDATE positions
                SET status = 'closed', exit_price = ?, exit_date = ?,
                    exit_reason = ?, pnl_inr = ?, pnl_pct = ?, held_days = ?
                WHERE id = ?
            "#,
        )
        .bind(exit_price)
        .bind(now)
        .bind(reason)
        .bind(pnl_inr)
        .bind(pnl_pct)
        .bind(held_days)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use common::models::{PositionStatus, TradeAction};

    fn long_insert(symbol: &str) -> PositionInsert {
        PositionInsert {
            suggestion_id: None,
            symbol: symbol.to_string(),
            action: TradeAction::Buy,
            entry_price: 200.0,
            quantity: 50,
            current_stop: 188.0,
            target: 220.0,
            is_externally_created: false,
        }
    }

    #[tokio::test]
    async fn open_positions_round_trip() {
        let pool = connect_in_memory().await.unwrap();
        PositionsRepository::insert(&pool, &long_insert("TITAN"), Utc::now())
            .await
            .unwrap();

        let open = PositionsRepository::open(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "TITAN");
        assert_eq!(open[0].status, PositionStatus::Open);
        assert!(!open[0].is_externally_created);
        assert_eq!(PositionsRepository::count_open(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_long_computes_pnl() {
        let pool = connect_in_memory().await.unwrap();
        let id = PositionsRepository::insert(&pool, &long_insert("TITAN"), Utc::now())
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let closed =
            PositionsRepository::close(&mut conn, id, 220.0, ExitReason::TargetHit, Utc::now())
                .await
                .unwrap()
                .unwrap();

        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_reason, Some(ExitReason::TargetHit));
        // (220 - 200) * 50 = 1000, on 10_000 invested = +10%
        assert!((closed.pnl_inr.unwrap() - 1000.0).abs() < 1e-9);
        assert!((closed.pnl_pct.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(PositionsRepository::count_open(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_short_gains_on_falling_price() {
        let pool = connect_in_memory().await.unwrap();
        let mut p = long_insert("WIPRO");
        p.action = TradeAction::Sell;
        p.current_stop = 212.0;
        p.target = 180.0;
        let id = PositionsRepository::insert(&pool, &p, Utc::now()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let closed =
            PositionsRepository::close(&mut conn, id, 180.0, ExitReason::TargetHit, Utc::now())
                .await
                .unwrap()
                .unwrap();

        // Short from 200 to 180: (180 - 200) * 50 * -1 = +1000
        assert!((closed.pnl_inr.unwrap() - 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn open_by_symbol_ignores_closed() {
        let pool = connect_in_memory().await.unwrap();
        let id = PositionsRepository::insert(&pool, &long_insert("DIXON"), Utc::now())
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        PositionsRepository::close(&mut conn, id, 210.0, ExitReason::Manual, Utc::now())
            .await
            .unwrap();

        assert!(PositionsRepository::open_by_symbol(&pool, "DIXON")
            .await
            .unwrap()
            .is_none());
    }
}
