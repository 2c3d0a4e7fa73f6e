/// Database layer for the moderation desk
///
/// Manages the SQLite connection pool, embedded migrations, and the
/// deadline wrapper every store call goes through.

use crate::error::{ModerationError, ModResult};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> ModResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied.
///
/// Each SQLite `:memory:` connection is its own database, so the pool is
/// capped at one connection that is never recycled.
pub async fn memory_pool() -> ModResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> ModResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ModerationError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ModResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Bound a store or audit call by `limit`; expiry surfaces as `Transient`.
pub async fn within<T, F>(limit: Duration, operation: &str, fut: F) -> ModResult<T>
where
    F: Future<Output = ModResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ModerationError::Transient(format!(
            "{} timed out after {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}
