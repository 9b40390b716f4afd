use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filter_common::CacheKey;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;

use super::{CacheEntry, CacheStore};

/// Translation cache persisted in SQLite, shared across restarts.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
    ttl: Option<Duration>,
}

impl SqliteCache {
    pub async fn new(database_url: &str, ttl: Option<Duration>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open cache database {}", database_url))?;
        Self::with_pool(pool, ttl).await
    }

    pub async fn with_pool(pool: SqlitePool, ttl: Option<Duration>) -> Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("Failed to run cache migrations")?;
        Ok(Self { pool, ttl })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, created_at FROM translation_cache WHERE cache_key = ?")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let Some((raw, created_at_ms)) = row else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt cache entry {}", key))?;
        let created_at = DateTime::from_timestamp_millis(created_at_ms)
            .with_context(|| format!("Invalid cache timestamp {} for {}", created_at_ms, key))?;

        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at,
        };
        if entry.is_expired(self.ttl, Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn put(&self, key: &CacheKey, value: &Value) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO translation_cache (cache_key, value, created_at) VALUES (?, ?, ?)",
        )
        .bind(key.as_str())
        .bind(value.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let cutoff = Utc::now().timestamp_millis() - ttl.as_millis() as i64;
        let result = sqlx::query("DELETE FROM translation_cache WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_cache(ttl: Option<Duration>) -> SqliteCache {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteCache::with_pool(pool, ttl).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_cache_roundtrip() {
        let cache = setup_cache(None).await;
        let key = CacheKey::derive("anthropic", "m", "translateQuery", &json!({"query": "done"}));

        assert!(cache.get(&key).await.unwrap().is_none());
        cache
            .put(&key, &json!({"filters": [{"field": "done", "op": "eq", "value": true}]}))
            .await
            .unwrap();

        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.value["filters"][0]["field"], "done");
    }

    #[tokio::test]
    async fn test_sqlite_cache_replace() {
        let cache = setup_cache(None).await;
        let key = CacheKey::from_hex("k");
        cache.put(&key, &json!(1)).await.unwrap();
        cache.put(&key, &json!(2)).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM translation_cache")
            .fetch_one(&cache.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        assert_eq!(cache.get(&key).await.unwrap().unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_sqlite_cache_expired_entries() {
        let cache = setup_cache(Some(Duration::from_secs(60))).await;
        sqlx::query("INSERT INTO translation_cache (cache_key, value, created_at) VALUES (?, ?, ?)")
            .bind("old")
            .bind("1")
            .bind(Utc::now().timestamp_millis() - 120_000)
            .execute(&cache.pool)
            .await
            .unwrap();

        assert!(cache.get(&CacheKey::from_hex("old")).await.unwrap().is_none());
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_purge_keeps_fresh_entries() {
        let cache = setup_cache(Some(Duration::from_secs(60))).await;
        sqlx::query("INSERT INTO translation_cache (cache_key, value, created_at) VALUES (?, ?, ?)")
            .bind("old")
            .bind("1")
            .bind(Utc::now().timestamp_millis() - 120_000)
            .execute(&cache.pool)
            .await
            .unwrap();
        cache.put(&CacheKey::from_hex("fresh"), &json!(2)).await.unwrap();

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM translation_cache")
            .fetch_one(&cache.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        assert!(cache.get(&CacheKey::from_hex("fresh")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sqlite_cache_corrupt_value() {
        let cache = setup_cache(None).await;
        sqlx::query("INSERT INTO translation_cache (cache_key, value, created_at) VALUES (?, ?, ?)")
            .bind("bad")
            .bind("{not json")
            .bind(0i64)
            .execute(&cache.pool)
            .await
            .unwrap();

        let err = cache.get(&CacheKey::from_hex("bad")).await.unwrap_err();
        assert!(err.to_string().contains("Corrupt cache entry"));
    }
}
