use async_trait::async_trait;
use agg_core::{ArticleCache, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Process-local TTL cache for read endpoints.
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Value)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ArticleCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key.to_string(), (Instant::now(), value));
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.put("stats", json!({"total": 3})).await.unwrap();
        assert_eq!(cache.get("stats").await.unwrap(), Some(json!({"total": 3})));
        assert_eq!(cache.get("latest").await.unwrap(), None);

        cache.invalidate().await.unwrap();
        assert_eq!(cache.get("stats").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = MemoryCache::new(Duration::from_millis(10));
        cache.put("stats", json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("stats").await.unwrap(), None);

        cache.put("other", json!(2)).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }
}
