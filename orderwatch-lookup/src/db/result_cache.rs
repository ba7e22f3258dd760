//! Persistent result cache
//!
//! Maps an identifier-set fingerprint to the finalized [`ResultSet`] of a
//! clean lookup run. Entries older than the TTL are never served; they stay
//! on disk until [`ResultCache::purge_expired`] removes them.
//!
//! Cache failures never reach callers: every error is logged at `warn` and
//! treated as a miss (reads) or a no-op (writes).

use crate::models::ResultSet;
use orderwatch_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed result cache
#[derive(Clone)]
pub struct ResultCache {
    pool: Option<SqlitePool>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool: Some(pool),
            ttl,
        }
    }

    /// Cache that never hits and never stores
    pub fn disabled() -> Self {
        Self {
            pool: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Fresh entry for `fingerprint`, if any
    pub async fn get(&self, fingerprint: &str) -> Option<ResultSet> {
        self.get_at(fingerprint, now_ms()).await
    }

    /// [`ResultCache::get`] evaluated at `now` (epoch ms)
    pub async fn get_at(&self, fingerprint: &str, now: i64) -> Option<ResultSet> {
        let pool = self.pool.as_ref()?;
        match self.read_entry(pool, fingerprint, now).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn read_entry(
        &self,
        pool: &SqlitePool,
        fingerprint: &str,
        now: i64,
    ) -> Result<Option<ResultSet>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT data, timestamp FROM result_cache WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_optional(pool)
                .await?;

        let Some((data, timestamp)) = row else {
            tracing::debug!(fingerprint = %fingerprint, "Cache miss");
            return Ok(None);
        };

        if now.saturating_sub(timestamp) > self.ttl_ms() {
            tracing::debug!(fingerprint = %fingerprint, age_ms = now - timestamp, "Cache entry expired");
            return Ok(None);
        }

        let result: ResultSet = serde_json::from_str(&data)
            .map_err(|e| Error::Internal(format!("Corrupt cache entry: {}", e)))?;
        tracing::debug!(fingerprint = %fingerprint, records = result.len(), "Cache hit");
        Ok(Some(result))
    }

    /// Store `result` (last write wins), then purge expired entries
    ///
    /// Returns whether the entry was written.
    pub async fn put(&self, fingerprint: &str, result: &ResultSet) -> bool {
        let written = self.put_at(fingerprint, result, now_ms()).await;
        if written {
            self.purge_expired().await;
        }
        written
    }

    /// Store `result` stamped with `timestamp` (epoch ms); returns whether it was written
    pub async fn put_at(&self, fingerprint: &str, result: &ResultSet, timestamp: i64) -> bool {
        let Some(pool) = self.pool.as_ref() else {
            return false;
        };
        match write_entry(pool, fingerprint, result, timestamp).await {
            Ok(()) => {
                tracing::debug!(fingerprint = %fingerprint, records = result.len(), "Cached result");
                true
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Delete expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_ms()).await
    }

    /// [`ResultCache::purge_expired`] evaluated at `now` (epoch ms)
    pub async fn purge_expired_at(&self, now: i64) -> usize {
        let Some(pool) = self.pool.as_ref() else {
            return 0;
        };
        let cutoff = now.saturating_sub(self.ttl_ms());
        match sqlx::query("DELETE FROM result_cache WHERE timestamp < ?")
            .bind(cutoff)
            .execute(pool)
            .await
        {
            Ok(done) => {
                let removed = done.rows_affected() as usize;
                if removed > 0 {
                    tracing::info!(removed, "Purged expired cache entries");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache purge failed");
                0
            }
        }
    }
}

async fn write_entry(
    pool: &SqlitePool,
    fingerprint: &str,
    result: &ResultSet,
    timestamp: i64,
) -> Result<()> {
    let data = serde_json::to_string(result)
        .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO result_cache (fingerprint, data, timestamp)
        VALUES (?, ?, ?)
        ON CONFLICT(fingerprint) DO UPDATE SET
            data = excluded.data,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(fingerprint)
    .bind(data)
    .bind(timestamp)
    .execute(pool)
    .await?;

    Ok(())
}
