use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions,
};
use tracing::info;

/// Open (creating if missing) the ledger database and apply the schema.
pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30))
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;
    info!("Ledger database ready at {}", path);
    Ok(pool)
}

/// Single-connection in-memory database for tests. One connection, pinned,
/// so the schema survives for the pool's lifetime.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema = include_str!("../sql/schema.sql");
    sqlx::query(schema).execute(pool).await?;
    Ok(())
}
