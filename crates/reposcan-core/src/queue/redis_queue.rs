use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

use super::{Delivery, QueueError, WorkQueue};

/// Redis-backed [`WorkQueue`]: a sorted set `{name}:ready` scored by the
/// Unix timestamp a job becomes visible, and a hash `{name}:processing`
/// holding `(payload, invisible_until)` for claimed jobs. A claim is a
/// small Lua script doing the pop-lowest-score-and-move-to-processing
/// atomically, so two workers never claim the same job.
pub struct RedisQueue<T> {
    client: redis::Client,
    name: String,
    _marker: PhantomData<T>,
}

impl<T> RedisQueue<T> {
    pub fn new(client: redis::Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    fn ready_key(&self) -> String {
        format!("{}:ready", self.name)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.name)
    }
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

// Atomically pops the lowest-scoring ready member (if its score <= now)
// and moves it into the processing hash with an invisible-until score.
const CLAIM_SCRIPT: &str = r#"
local ready_key = KEYS[1]
local processing_key = KEYS[2]
local now = tonumber(ARGV[1])
local invisible_until = ARGV[2]

local members = redis.call('ZRANGEBYSCORE', ready_key, '-inf', now, 'LIMIT', 0, 1)
if #members == 0 then
    return false
end
local member = members[1]
redis.call('ZREM', ready_key, member)
redis.call('HSET', processing_key, member, invisible_until .. ':' .. member)
return member
"#;

#[async_trait]
impl<T> WorkQueue<T> for RedisQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn enqueue(&self, payload: T) -> Result<(), QueueError> {
        self.enqueue_after(payload, 0).await
    }

    async fn enqueue_after(&self, payload: T, delay_secs: u64) -> Result<(), QueueError> {
        let json = serde_json::to_string(&payload)?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let score = now_unix() + delay_secs as f64;
        conn.zadd::<_, _, _, ()>(self.ready_key(), json, score)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn claim(&self, visibility_timeout_secs: u64) -> Result<Option<Delivery<T>>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let invisible_until = now_unix() + visibility_timeout_secs as f64;
        let member: Option<String> = redis::Script::new(CLAIM_SCRIPT)
            .key(self.ready_key())
            .key(self.processing_key())
            .arg(now_unix())
            .arg(invisible_until)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let Some(json) = member else {
            return Ok(None);
        };
        let payload: T = serde_json::from_str(&json)?;

        let client = self.client.clone();
        let processing_key = self.processing_key();
        let member_field = json.clone();
        let delivery = Delivery::new(payload, move |acked| {
            // Best-effort: drop this into a detached task since Drop is
            // synchronous. Redis connections are cheap multiplexed
            // clones, so this fires-and-forgets without blocking.
            tokio::spawn(async move {
                if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                    let _: Result<(), _> = conn.hdel(&processing_key, &member_field).await;
                    if !acked {
                        let _: Result<(), _> = conn
                            .zadd::<_, _, _, ()>(
                                processing_key.trim_end_matches(":processing").to_string() + ":ready",
                                member_field,
                                now_unix(),
                            )
                            .await;
                    }
                }
            });
        });
        Ok(Some(delivery))
    }

    async fn ready_len(&self) -> Result<usize, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let n: usize = conn
            .zcard(self.ready_key())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(n)
    }

    async fn in_flight_len(&self) -> Result<usize, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let n: usize = conn
            .hlen(self.processing_key())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(n)
    }

    /// Scans the processing hash for entries whose invisible-until
    /// timestamp has lapsed and moves them back onto the ready set.
    /// Should be run periodically by a reconciler task; cheap at the
    /// scale this pipeline runs at (hundreds, not millions, in flight).
    async fn reconcile(&self) -> Result<usize, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let entries: Vec<(String, String)> = conn
            .hgetall(self.processing_key())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let now = now_unix();
        let mut swept = 0usize;
        for (member, marker) in entries {
            let Some((deadline_str, _)) = marker.split_once(':') else {
                continue;
            };
            let Ok(deadline) = deadline_str.parse::<f64>() else {
                continue;
            };
            if deadline <= now {
                let _: () = conn
                    .hdel(self.processing_key(), &member)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                let _: () = conn
                    .zadd(self.ready_key(), &member, now)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
