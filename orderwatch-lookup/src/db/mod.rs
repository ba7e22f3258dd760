//! Database access for orderwatch-lookup
//!
//! SQLite file `orderwatch.db` in the data folder holds the persistent
//! result cache.

pub mod result_cache;

pub use result_cache::ResultCache;

use orderwatch_common::Result;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Open the result cache, falling back to a disabled cache
///
/// `None` (no usable data folder) or a database that fails to open both
/// yield [`ResultCache::disabled`]; lookups then always go to the remote
/// service.
pub async fn open_result_cache(db_path: Option<&Path>, ttl: Duration) -> ResultCache {
    let Some(db_path) = db_path else {
        tracing::warn!("No data folder, continuing without result cache");
        return ResultCache::disabled();
    };

    match init_database_pool(db_path).await {
        Ok(pool) => {
            tracing::info!("Database: {}", db_path.display());
            ResultCache::new(pool, ttl)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %db_path.display(),
                "Result cache unavailable, continuing without it"
            );
            ResultCache::disabled()
        }
    }
}

/// Initialize database connection pool and create tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS result_cache (
            fingerprint TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_result_cache_timestamp ON result_cache(timestamp)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (result_cache)");

    Ok(())
}
