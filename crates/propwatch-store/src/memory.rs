use moka::future::Cache;
use std::time::Duration;

/// In-memory hot cache backed by moka.
///
/// Holds serialized roster lookups. Entries are evicted after TTL so a
/// roster sync shows up without restarting the run.
pub struct MemoryCache {
    inner: Cache<String, String>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, value: String) {
        self.inner.insert(key, value).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
