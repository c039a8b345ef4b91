use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Keyed cache whose entries expire after a fixed TTL.
///
/// There is no eviction besides expiry; writers call [`TtlCache::invalidate`]
/// after changing the underlying data. A zero TTL disables caching.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: &str, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fresh_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1).await;
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_ignored() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("a", 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn invalidate_drops_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1).await;
        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("a", 1).await;
        assert_eq!(cache.get("a").await, None);
    }
}
