use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheError, ProcessedCache};

struct Inner {
    audit: HashSet<String>,
    expires_at: HashMap<String, Instant>,
}

/// In-memory processed-repo cache for dev, tests, and single-process
/// deployments.
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                audit: HashSet::new(),
                expires_at: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl ProcessedCache for MemoryCache {
    async fn is_recently_processed(&self, full_name: &str) -> Result<bool, CacheError> {
        let guard = self.inner.lock().expect("cache mutex poisoned");
        Ok(match guard.expires_at.get(full_name) {
            Some(expiry) => *expiry > Instant::now(),
            None => false,
        })
    }

    async fn mark_processed(&self, full_name: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        guard.audit.insert(full_name.to_string());
        guard
            .expires_at
            .insert(full_name.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        Ok(())
    }

    async fn audit_count(&self) -> Result<usize, CacheError> {
        Ok(self.inner.lock().expect("cache mutex poisoned").audit.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unmarked_repo_is_not_processed() {
        let cache = MemoryCache::new();
        assert!(!cache.is_recently_processed("acme/foo").await.unwrap());
    }

    #[tokio::test]
    async fn marked_repo_is_processed_until_ttl_then_not() {
        let cache = MemoryCache::new();
        cache.mark_processed("acme/foo", 3600).await.unwrap();
        assert!(cache.is_recently_processed("acme/foo").await.unwrap());

        cache.mark_processed("acme/bar", 0).await.unwrap();
        // A zero-second TTL means already expired by the time we check.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!cache.is_recently_processed("acme/bar").await.unwrap());
    }

    #[tokio::test]
    async fn audit_count_survives_ttl_expiry() {
        let cache = MemoryCache::new();
        cache.mark_processed("acme/foo", 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!cache.is_recently_processed("acme/foo").await.unwrap());
        assert_eq!(cache.audit_count().await.unwrap(), 1);
    }
}
