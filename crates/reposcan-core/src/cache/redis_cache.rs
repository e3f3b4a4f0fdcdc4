use async_trait::async_trait;
use redis::AsyncCommands;

use super::{CacheError, ProcessedCache};

const AUDIT_SET_KEY: &str = "escaped:processed_repos";
const TTL_KEY_PREFIX: &str = "escaped:processed:";

/// Redis-backed processed-repo cache. `SADD` on the audit set never
/// expires; the per-repo `SET ... EX` key is what `is_recently_processed`
/// actually checks, so repos naturally age back into analysis eligibility.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn ttl_key(full_name: &str) -> String {
        format!("{TTL_KEY_PREFIX}{full_name}")
    }
}

#[async_trait]
impl ProcessedCache for RedisCache {
    async fn is_recently_processed(&self, full_name: &str) -> Result<bool, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let exists: bool = conn
            .exists(Self::ttl_key(full_name))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(exists)
    }

    async fn mark_processed(&self, full_name: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        conn.sadd::<_, _, ()>(AUDIT_SET_KEY, full_name)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        conn.set_ex::<_, _, ()>(Self::ttl_key(full_name), "1", ttl_secs)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn audit_count(&self) -> Result<usize, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let n: usize = conn
            .scard(AUDIT_SET_KEY)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(n)
    }
}
