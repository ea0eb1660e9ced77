//! SQLite pool construction from the `database` config section. Foreign
//! keys are enabled per connection because line, activity, and event rows
//! cascade from their parent request.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use signoff_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open a pool from the validated `database` section of the app config.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // The busy timeout tracks the acquire window so a writer waiting on the
    // database lock queues for as long as a caller waiting on the pool.
    let busy_timeout_ms = timeout_secs.clamp(1, 60).saturating_mul(1000);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
