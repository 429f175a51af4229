use crate::metrics;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key-value persistence contract shared by the token cache and the route cache.
///
/// Engines only need last-write-wins upserts; no cross-key transactions are required.
#[async_trait]
pub trait Cache<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>>;

    async fn set(&self, key: &str, value: T) -> Result<()>;

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

/// Lock-free in-process cache engine.
///
/// Entries optionally expire after `ttl`; when `max_entries` is exceeded the oldest
/// entries are evicted on insert.
#[derive(Debug, Clone)]
pub struct InMemoryCache<T> {
    name: &'static str,
    entries: Arc<DashMap<String, Entry<T>>>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl<T: Clone + Send + Sync + 'static> InMemoryCache<T> {
    pub fn new(name: &'static str, max_entries: usize) -> Self {
        Self {
            name,
            entries: Arc::new(DashMap::new()),
            ttl: None,
            max_entries: max_entries.max(1),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &Entry<T>) -> bool {
        self.ttl
            .map(|ttl| entry.inserted_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    pub fn get_sync(&self, key: &str) -> Option<T> {
        let found = self.entries.get(key).and_then(|entry| {
            if self.is_expired(entry.value()) {
                None
            } else {
                Some(entry.value().value.clone())
            }
        });
        match found {
            Some(value) => {
                metrics::increment_cache_hit(self.name);
                Some(value)
            }
            None => {
                // Expired entries are dropped lazily
                self.entries.remove_if(key, |_, entry| self.is_expired(entry));
                metrics::increment_cache_miss(self.name);
                None
            }
        }
    }

    pub fn set_sync(&self, key: &str, value: T) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.maybe_evict();
        metrics::set_cache_size(self.name, self.entries.len() as f64);
    }

    fn maybe_evict(&self) {
        let len = self.entries.len();
        if len <= self.max_entries {
            return;
        }
        let to_remove = len - self.max_entries;
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().inserted_at))
            .collect();
        by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
        for (key, _) in by_age.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }
        debug!(
            "Evicted {} entries from {} cache (size: {})",
            to_remove,
            self.name,
            self.entries.len()
        );
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Cache<T> for InMemoryCache<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: T) -> Result<()> {
        self.set_sync(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_write_wins() {
        let cache = InMemoryCache::new("test", 10);
        cache.set("k", 1u32).await.unwrap();
        cache.set("k", 2u32).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(2));
        assert!(cache.has("k").await.unwrap());
        assert!(!cache.has("missing").await.unwrap());
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let cache = InMemoryCache::new("test", 2);
        cache.set("a", 1u32).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("b", 2u32).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("c", 3u32).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = InMemoryCache::new("test", 10).with_ttl(Duration::from_millis(5));
        cache.set("k", 1u32).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
