//! Processed-repo cache: tracks which repos have already been analyzed
//! so the discovery worker can skip them, and lets them fall back out of
//! the cache after a TTL so they become eligible for re-analysis.
//!
//! A plain trait, an in-memory map for dev/single-process use, and an
//! optional Redis-backed implementation (`SADD` for the permanent audit
//! trail, `SET EX` for the TTL-bounded re-analysis guard) for cluster use.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_cache;

use async_trait::async_trait;

pub use memory::MemoryCache;
#[cfg(feature = "redis-backend")]
pub use redis_cache::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Tracks processed repositories. `mark_processed` always records the
/// repo in a permanent audit set and separately in a TTL-bounded key;
/// `is_recently_processed` only consults the TTL-bounded key, so a repo
/// ages back into eligibility after `ttl_secs` even though it remains
/// in the audit trail forever.
#[async_trait]
pub trait ProcessedCache: Send + Sync {
    async fn is_recently_processed(&self, full_name: &str) -> Result<bool, CacheError>;

    async fn mark_processed(&self, full_name: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Total distinct repos ever marked processed, for operator metrics.
    async fn audit_count(&self) -> Result<usize, CacheError>;
}
