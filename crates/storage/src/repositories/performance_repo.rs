use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

use common::models::{SignalPerformance, Timeframe};

pub struct PerformanceRepository;

impl PerformanceRepository {
    pub async fn get_or_create(
        conn: &mut SqliteConnection,
        signal_name: &str,
        timeframe: Timeframe,
    ) -> Result<SignalPerformance, sqlx::Error> {
        sqlx::query(
            "INSERT INTO signal_performance (signal_name, timeframe) VALUES (?, ?) \
             ON CONFLICT (signal_name, timeframe) DO NOTHING",
        )
        .bind(signal_name)
        .bind(timeframe)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, SignalPerformance>(
            "SELECT * FROM signal_performance WHERE signal_name = ? AND timeframe = ?",
        )
        .bind(signal_name)
        .bind(timeframe)
        .fetch_one(&mut *conn)
        .await
    }

    /// Fold one executed-trade outcome into the rolling stats. Averages are
    /// running simple means over executed trades, so they converge and never
    /// reset.
    pub async fn record_outcome(
        conn: &mut SqliteConnection,
        signal_name: &str,
        timeframe: Timeframe,
        pnl_pct: f64,
        risk_reward: f64,
        held_days: i64,
    ) -> Result<SignalPerformance, sqlx::Error> {
        let sp = Self::get_or_create(&mut *conn, signal_name, timeframe).await?;

        let executed = sp.executed_signals + 1;
        let winning = sp.winning_trades + i64::from(pnl_pct > 0.0);
        let n = executed as f64;
        let avg_pnl_pct = sp.avg_pnl_pct + (pnl_pct - sp.avg_pnl_pct) / n;
        let avg_risk_reward = sp.avg_risk_reward + (risk_reward - sp.avg_risk_reward) / n;
        let avg_held_days = sp.avg_held_days + (held_days as f64 - sp.avg_held_days) / n;
        let win_rate = winning as f64 / n;

        sqlx::query(
            r#"
                UPDATE signal_performance
                SET total_signals = total_signals + 1,
                    executed_signals = ?, winning_trades = ?, win_rate = ?,
                    avg_pnl_pct = ?, avg_risk_reward = ?, avg_held_days = ?
                WHERE id = ?
            "#,
        )
        .bind(executed)
        .bind(winning)
        .bind(win_rate)
        .bind(avg_pnl_pct)
        .bind(avg_risk_reward)
        .bind(avg_held_days)
        .bind(sp.id)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, SignalPerformance>("SELECT * FROM signal_performance WHERE id = ?")
            .bind(sp.id)
            .fetch_one(conn)
            .await
    }

    /// A skipped suggestion still counts toward the signal's denominator so
    /// the execution rate stays honest.
    pub async fn record_skipped(
        conn: &mut SqliteConnection,
        signal_name: &str,
        timeframe: Timeframe,
    ) -> Result<(), sqlx::Error> {
        let sp = Self::get_or_create(&mut *conn, signal_name, timeframe).await?;
        sqlx::query("UPDATE signal_performance SET total_signals = total_signals + 1 WHERE id = ?")
            .bind(sp.id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn all<'e, E>(ex: E) -> Result<Vec<SignalPerformance>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SignalPerformance>(
            "SELECT * FROM signal_performance ORDER BY signal_name",
        )
        .fetch_all(ex)
        .await
    }

    pub async fn with_min_trades<'e, E>(
        ex: E,
        min_trades: i64,
    ) -> Result<Vec<SignalPerformance>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SignalPerformance>(
            "SELECT * FROM signal_performance WHERE executed_signals >= ? ORDER BY signal_name",
        )
        .bind(min_trades)
        .fetch_all(ex)
        .await
    }

    pub async fn set_weight<'e, E>(
        ex: E,
        id: i64,
        weight: f64,
        calibrated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE signal_performance SET signal_weight = ?, last_calibrated = ? WHERE id = ?",
        )
        .bind(weight)
        .bind(calibrated_at)
        .bind(id)
        .execute(ex)
        .await?;
        Ok(())
    }

    /// Latest committed daily weight snapshot, keyed by signal name. Signals
    /// without a row fall back to the default weight at the call site.
    pub async fn weights<'e, E>(ex: E) -> Result<HashMap<String, f64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT signal_name, signal_weight FROM signal_performance WHERE timeframe = 'daily'",
        )
        .fetch_all(ex)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let a = PerformanceRepository::get_or_create(&mut conn, "ema_crossover", Timeframe::Daily)
            .await
            .unwrap();
        let b = PerformanceRepository::get_or_create(&mut conn, "ema_crossover", Timeframe::Daily)
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.signal_weight, SignalPerformance::DEFAULT_WEIGHT);
    }

    #[tokio::test]
    async fn outcome_updates_running_means() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let sp =
            PerformanceRepository::record_outcome(&mut conn, "rsi_divergence", Timeframe::Daily,
                2.0, 2.5, 4)
            .await
            .unwrap();
        assert_eq!(sp.executed_signals, 1);
        assert_eq!(sp.winning_trades, 1);
        assert!((sp.avg_pnl_pct - 2.0).abs() < 1e-9);

        let sp =
            PerformanceRepository::record_outcome(&mut conn, "rsi_divergence", Timeframe::Daily,
                -1.0, 0.5, 2)
            .await
            .unwrap();
        assert_eq!(sp.executed_signals, 2);
        assert_eq!(sp.winning_trades, 1);
        assert!((sp.win_rate - 0.5).abs() < 1e-9);
        assert!((sp.avg_pnl_pct - 0.5).abs() < 1e-9);
        assert!((sp.avg_held_days - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn skipped_bumps_only_totals() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        PerformanceRepository::record_skipped(&mut conn, "volume_breakout", Timeframe::Daily)
            .await
            .unwrap();
        let all = PerformanceRepository::all(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_signals, 1);
        assert_eq!(all[0].executed_signals, 0);
    }

    #[tokio::test]
    async fn weights_snapshot_defaults_to_one() {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        PerformanceRepository::get_or_create(&mut conn, "ema_crossover", Timeframe::Daily)
            .await
            .unwrap();
        drop(conn);

        let weights = PerformanceRepository::weights(&pool).await.unwrap();
        assert_eq!(weights.get("ema_crossover"), Some(&1.0));
        assert_eq!(weights.get("rsi_divergence"), None);
    }
}
