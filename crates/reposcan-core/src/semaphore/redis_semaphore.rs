use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{Lease, PipelineSemaphore, SemaphoreError};

const COUNTER_KEY: &str = "pipeline:active_count";
const LEASE_PREFIX: &str = "pipeline:lease:";

/// Lease TTL: generous relative to a single analysis run so a live
/// worker's heartbeat (re-set on the lease key) always beats it, but
/// short enough that a crashed worker's drift self-heals quickly.
const LEASE_TTL_SECS: u64 = 3600;

// Atomic check-and-increment: refuses if the counter (lazily initialized
// to 0) is already at the cap, otherwise increments and returns the new
// value. One round trip, so two callers can't both observe a free slot.
const ACQUIRE_SCRIPT: &str = r#"
local counter_key = KEYS[1]
local max_concurrent = tonumber(ARGV[1])
local current = tonumber(redis.call('GET', counter_key) or '0')
if current >= max_concurrent then
    return -1
end
return redis.call('INCR', counter_key)
"#;

/// Redis-backed [`PipelineSemaphore`]. The counter lives at
/// `pipeline:active_count`; each successful acquire also writes a
/// `pipeline:lease:{uuid}` sentinel with a TTL so `reconcile_counter`
/// can recount live leases after a crash.
#[derive(Clone)]
pub struct RedisSemaphore {
    client: redis::Client,
}

impl RedisSemaphore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineSemaphore for RedisSemaphore {
    async fn try_acquire(&self, max_concurrent: i64) -> Result<Option<Lease>, SemaphoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;

        let result: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(COUNTER_KEY)
            .arg(max_concurrent)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;

        if result < 0 {
            return Ok(None);
        }

        let id = Uuid::new_v4();
        let lease_key = format!("{LEASE_PREFIX}{id}");
        conn.set_ex::<_, _, ()>(&lease_key, "1", LEASE_TTL_SECS)
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;

        let client = self.client.clone();
        Ok(Some(Lease::new(id, move || {
            tokio::spawn(async move {
                let mut conn = match client.get_multiplexed_async_connection().await {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::error!(%err, lease_id = %id, "failed to connect to redis to release semaphore lease");
                        return;
                    }
                };
                if let Err(err) = conn.decr::<_, _, ()>(COUNTER_KEY, 1).await {
                    tracing::error!(%err, lease_id = %id, "failed to decrement semaphore counter on release");
                }
                if let Err(err) = conn.del::<_, ()>(format!("{LEASE_PREFIX}{id}")).await {
                    tracing::error!(%err, lease_id = %id, "failed to delete semaphore lease sentinel on release");
                }
            });
        })))
    }

    async fn current_count(&self) -> Result<i64, SemaphoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;
        let n: Option<i64> = conn
            .get(COUNTER_KEY)
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;
        Ok(n.unwrap_or(0))
    }

    /// Recounts live `pipeline:lease:*` sentinels with `SCAN` and sets
    /// the counter to that value. Run periodically (e.g. from the
    /// operator-facing `admin reconcile-counter` command) to bound
    /// drift left by workers that crashed without releasing.
    async fn reconcile_counter(&self) -> Result<i64, SemaphoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;

        let mut cursor = 0u64;
        let mut live = 0i64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{LEASE_PREFIX}*"))
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| SemaphoreError::Backend(e.to_string()))?;
            live += keys.len() as i64;
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        conn.set::<_, _, ()>(COUNTER_KEY, live)
            .await
            .map_err(|e| SemaphoreError::Backend(e.to_string()))?;
        Ok(live)
    }
}
