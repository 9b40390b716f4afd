use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::CacheStore;

/// Background service that deletes expired translation cache entries
pub struct CachePurgeService {
    cache: Arc<dyn CacheStore>,
    interval: Duration,
}

impl CachePurgeService {
    pub fn new(cache: Arc<dyn CacheStore>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run the purge loop indefinitely. The first purge happens immediately.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.purge_once().await {
                tracing::error!("Cache purge failed: {:#}", e);
            }
        }
    }

    async fn purge_once(&self) -> Result<u64> {
        let removed = self.cache.purge_expired().await?;
        if removed > 0 {
            tracing::info!("Purged {} expired translation cache entries", removed);
        } else {
            tracing::debug!("No expired translation cache entries to purge");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, SqliteCache};
    use filter_common::CacheKey;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_purge_once_removes_expired() {
        let cache = Arc::new(MemoryCache::new(Some(Duration::from_millis(10))));
        cache.put(&CacheKey::from_hex("a"), &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let service = CachePurgeService::new(cache.clone(), Duration::from_secs(60));
        assert_eq!(service.purge_once().await.unwrap(), 1);
        assert_eq!(service.purge_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_purges_sqlite_cache_periodically() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = Arc::new(
            SqliteCache::with_pool(pool, Some(Duration::from_millis(20)))
                .await
                .unwrap(),
        );
        let key = CacheKey::from_hex("old");
        cache.put(&key, &json!("v")).await.unwrap();

        let task = tokio::spawn(
            CachePurgeService::new(cache.clone(), Duration::from_millis(10)).run(),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        // Nothing left for a manual purge to remove
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
