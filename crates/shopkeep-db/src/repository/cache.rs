//! # Cache Repository
//!
//! JSON values keyed by string, kept across restarts.
//!
//! ## Stored Keys (by convention of the callers)
//! ```text
//! dashboard:counts:<timeframe>   → DashboardCounts
//! dashboard:performance          → SalesPerformance
//! notice:pending                 → message shown once after a forced logout
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct CacheRow {
    value_json: String,
    updated_at: String,
}

/// A cached value together with when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub value: T,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository for cached JSON values.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Reads `key`. A value that no longer decodes into `T` reads as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Reads `key` with its write time.
    pub async fn get_entry<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> DbResult<Option<CachedValue<T>>> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT value_json, updated_at FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&row.value_json) {
            Ok(value) => Ok(Some(CachedValue {
                value,
                updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
            })),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cached value");
                Ok(None)
            }
        }
    }

    /// Writes `value` under `key`, replacing what was there.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_string(value)?;
        debug!(key = %key, bytes = json.len(), "Caching value");

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads and deletes `key`.
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let value = self.get(key).await?;
        self.remove(key).await?;
        Ok(value)
    }

    /// Deletes `key`. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every key starting with `prefix`.
    pub async fn remove_prefix(&self, prefix: &str) -> DbResult<u64> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let result = sqlx::query("DELETE FROM cache_entries WHERE key LIKE ?1 ESCAPE '\\'")
            .bind(pattern)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes everything.
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use shopkeep_core::CountStat;

    async fn repo() -> CacheRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().cache()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let cache = repo().await;
        let stat = CountStat {
            count: 12,
            prev_count: 9,
        };

        cache.put("dashboard:products:month", &stat).await.unwrap();
        let read: Option<CountStat> = cache.get("dashboard:products:month").await.unwrap();
        assert_eq!(read, Some(stat));

        let newer = CountStat {
            count: 13,
            ..stat
        };
        cache.put("dashboard:products:month", &newer).await.unwrap();
        let entry = cache
            .get_entry::<CountStat>("dashboard:products:month")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.value.count, 13);
        assert!(entry.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_take_is_one_shot() {
        let cache = repo().await;
        cache.put("notice:pending", "Session expired").await.unwrap();

        let first: Option<String> = cache.take("notice:pending").await.unwrap();
        let second: Option<String> = cache.take("notice:pending").await.unwrap();
        assert_eq!(first.as_deref(), Some("Session expired"));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_wrong_shape_reads_as_absent() {
        let cache = repo().await;
        cache.put("k", "just a string").await.unwrap();
        let read: Option<CountStat> = cache.get("k").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let cache = repo().await;
        cache.put("dashboard:a", &1).await.unwrap();
        cache.put("dashboard:b", &2).await.unwrap();
        cache.put("notice:pending", "x").await.unwrap();

        assert_eq!(cache.remove_prefix("dashboard:").await.unwrap(), 2);
        assert!(cache.get::<String>("notice:pending").await.unwrap().is_some());

        cache.clear().await.unwrap();
        assert!(!cache.remove("notice:pending").await.unwrap());
    }
}
