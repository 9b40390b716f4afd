mod purge;
mod sqlite;

pub use purge::CachePurgeService;
pub use sqlite::SqliteCache;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filter_common::CacheKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::CacheConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            Some(ttl) => now - self.created_at > ttl,
            None => false,
        }
    }
}

/// Content-addressed store for computed results. Writes for the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    async fn put(&self, key: &CacheKey, value: &Value) -> Result<()>;
    /// Drop entries older than the TTL. Returns the number removed.
    async fn purge_expired(&self) -> Result<u64>;
}

pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match &config.database_url {
        Some(url) => {
            let cache = SqliteCache::new(url, config.ttl()).await?;
            tracing::info!("Translation cache persisted at {}", url);
            Ok(Arc::new(cache))
        }
        None => {
            tracing::info!("Translation cache kept in memory");
            Ok(Arc::new(MemoryCache::new(config.ttl())))
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn prune(entries: &mut HashMap<CacheKey, CacheEntry>, ttl: Option<Duration>) -> u64 {
        if ttl.is_none() {
            return 0;
        }
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl, now));
        (before - entries.len()) as u64
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire cache lock - possible poisoning"))?;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl, Utc::now()))
            .cloned())
    }

    async fn put(&self, key: &CacheKey, value: &Value) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire cache lock - possible poisoning"))?;
        Self::prune(&mut entries, self.ttl);
        entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                value: value.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire cache lock - possible poisoning"))?;
        Ok(Self::prune(&mut entries, self.ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new(None);
        let key = CacheKey::derive("anthropic", "m", "translateQuery", &json!({"q": 1}));

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.put(&key, &json!({"filters": []})).await.unwrap();

        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.value, json!({"filters": []}));
    }

    #[tokio::test]
    async fn test_memory_cache_last_write_wins() {
        let cache = MemoryCache::new(None);
        let key = CacheKey::from_hex("abc");
        cache.put(&key, &json!(1)).await.unwrap();
        cache.put(&key, &json!(2)).await.unwrap();

        assert_eq!(cache.entries.read().unwrap().len(), 1);
        assert_eq!(cache.get(&key).await.unwrap().unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_memory_cache_ttl_expiry() {
        let cache = MemoryCache::new(Some(Duration::from_millis(1)));
        let key = CacheKey::from_hex("abc");
        cache.put(&key, &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_put_evicts_expired() {
        let cache = MemoryCache::new(Some(Duration::from_millis(10)));
        cache.put(&CacheKey::from_hex("a"), &json!(1)).await.unwrap();
        cache.put(&CacheKey::from_hex("b"), &json!(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.put(&CacheKey::from_hex("c"), &json!(3)).await.unwrap();

        let entries = cache.entries.read().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(&CacheKey::from_hex("c")));
    }

    #[tokio::test]
    async fn test_memory_cache_purge_expired() {
        let cache = MemoryCache::new(Some(Duration::from_millis(10)));
        cache.put(&CacheKey::from_hex("a"), &json!(1)).await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.entries.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_cache_without_ttl_keeps_everything() {
        let cache = MemoryCache::new(None);
        cache.put(&CacheKey::from_hex("a"), &json!(1)).await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.entries.read().unwrap().len(), 1);
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry {
            key: CacheKey::from_hex("abc"),
            value: json!(null),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert!(!entry.is_expired(None, Utc::now()));
        assert!(entry.is_expired(Some(Duration::from_secs(60)), Utc::now()));
    }

    #[tokio::test]
    async fn test_open_cache_defaults_to_memory() {
        let cache = open_cache(&CacheConfig::default()).await.unwrap();
        let key = CacheKey::from_hex("k");
        cache.put(&key, &json!("v")).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().unwrap().value, json!("v"));
    }
}
