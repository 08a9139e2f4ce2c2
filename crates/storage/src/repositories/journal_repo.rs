use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

use common::models::DailyJournal;

pub struct JournalRepository;

impl JournalRepository {
    pub async fn get_or_create(
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> Result<DailyJournal, sqlx::Error> {
        sqlx::query("INSERT INTO daily_journal (date) VALUES (?) ON CONFLICT (date) DO NOTHING")
            .bind(date)
            .execute(&mut *conn)
            .await?;

        sqlx::query_as::<_, DailyJournal>("SELECT * FROM daily_journal WHERE date = ?")
            .bind(date)
            .fetch_one(conn)
            .await
    }

    pub async fn latest<'e, E>(ex: E) -> Result<Option<DailyJournal>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DailyJournal>(
            "SELECT * FROM daily_journal ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(ex)
        .await
    }

    /// Balance as of the most recent completed sync. Rows created by the
    /// suggestion counters before any sync carry no stamp and never
    /// establish a baseline.
    pub async fn last_synced_balance<'e, E>(ex: E) -> Result<Option<f64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar(
            "SELECT fund_balance_inr FROM daily_journal \
             WHERE last_sync_at IS NOT NULL ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(ex)
        .await
    }

    /// Stamp a completed broker sync: new balance, net funds added (only
    /// positive deltas accrue), and the sync timestamp. Always called:
    /// `last_sync_at` moves even when nothing changed.
    pub async fn stamp_sync(
        conn: &mut SqliteConnection,
        date: NaiveDate,
        fund_balance_inr: f64,
        fund_added_inr: f64,
        synced_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        Self::get_or_create(&mut *conn, date).await?;
        sqlx::query(
            "UPDATE daily_journal \
             SET fund_balance_inr = ?, fund_added_inr = fund_added_inr + ?, last_sync_at = ? \
             WHERE date = ?",
        )
        .bind(fund_balance_inr)
        .bind(fund_added_inr)
        .bind(synced_at)
        .bind(date)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn add_suggestions_sent(
        conn: &mut SqliteConnection,
        date: NaiveDate,
        count: i64,
    ) -> Result<(), sqlx::Error> {
        Self::get_or_create(&mut *conn, date).await?;
        sqlx::query(
            "UPDATE daily_journal SET suggestions_sent = suggestions_sent + ? WHERE date = ?",
        )
        .bind(count)
        .bind(date)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_response(
        conn: &mut SqliteConnection,
        date: NaiveDate,
        executed: bool,
    ) -> Result<(), sqlx::Error> {
        Self::get_or_create(&mut *conn, date).await?;
        let column = if executed {
            "suggestions_executed"
        } else {
            "suggestions_skipped"
        };
        let sql =
            format!("UPDATE daily_journal SET {column} = {column} + 1 WHERE date = ?");
        sqlx::query(&sql).bind(date).execute(conn).await?;
        Ok(())
    }

    pub async fn update_post_market(
        conn: &mut SqliteConnection,
        date: NaiveDate,
        total_pnl_inr: f64,
        total_pnl_pct: f64,
        open_positions_count: i64,
    ) -> Result<(), sqlx::Error> {
        Self::get_or_create(&mut *conn, date).await?;
        sqlx::query(
            "UPDATE daily_journal \
             SET total_pnl_inr = ?, total_pnl_pct = ?, open_positions_count = ? \
             WHERE date = ?",
        )
        .bind(total_pnl_inr)
        .bind(total_pnl_pct)
        .bind(open_positions_count)
        .bind(date)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_returns_same_row() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let a = JournalRepository::get_or_create(&mut conn, day(2026, 8, 4)).await.unwrap();
        let b = JournalRepository::get_or_create(&mut conn, day(2026, 8, 4)).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.fund_balance_inr, 0.0);
        assert!(a.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn stamp_sync_accrues_fund_added() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let d = day(2026, 8, 4);

        JournalRepository::stamp_sync(&mut conn, d, 500_000.0, 600.0, Utc::now())
            .await
            .unwrap();
        JournalRepository::stamp_sync(&mut conn, d, 500_600.0, 0.0, Utc::now())
            .await
            .unwrap();

        let j = JournalRepository::get_or_create(&mut conn, d).await.unwrap();
        assert!((j.fund_balance_inr - 500_600.0).abs() < 1e-9);
        assert!((j.fund_added_inr - 600.0).abs() < 1e-9);
        assert!(j.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn synced_balance_skips_rows_no_sync_touched() {
        let pool = connect_in_memory().await.unwrap();
        assert!(JournalRepository::last_synced_balance(&pool).await.unwrap().is_none());

        let mut conn = pool.acquire().await.unwrap();
        JournalRepository::stamp_sync(&mut conn, day(2026, 8, 3), 480_000.0, 0.0, Utc::now())
            .await
            .unwrap();
        // Today's row exists only because a response was recorded; its zero
        // balance must not become the baseline.
        JournalRepository::record_response(&mut conn, day(2026, 8, 4), true).await.unwrap();
        drop(conn);

        let balance = JournalRepository::last_synced_balance(&pool).await.unwrap();
        assert_eq!(balance, Some(480_000.0));
    }

    #[tokio::test]
    async fn latest_picks_most_recent_date() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        JournalRepository::get_or_create(&mut conn, day(2026, 8, 3)).await.unwrap();
        JournalRepository::get_or_create(&mut conn, day(2026, 8, 4)).await.unwrap();
        drop(conn);

        let latest = JournalRepository::latest(&pool).await.unwrap().unwrap();
        assert_eq!(latest.date, day(2026, 8, 4));
    }

    #[tokio::test]
    async fn responses_split_by_outcome() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let d = day(2026, 8, 4);

        JournalRepository::add_suggestions_sent(&mut conn, d, 3).await.unwrap();
        JournalRepository::record_response(&mut conn, d, true).await.unwrap();
        JournalRepository::record_response(&mut conn, d, false).await.unwrap();

        let j = JournalRepository::get_or_create(&mut conn, d).await.unwrap();
        assert_eq!(j.suggestions_sent, 3);
        assert_eq!(j.suggestions_executed, 1);
        assert_eq!(j.suggestions_skipped, 1);
    }
}
