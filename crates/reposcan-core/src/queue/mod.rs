//! At-least-once job queue with visibility timeout and redelivery.
//!
//! A `WorkQueue` async trait with a move-semantics delivery handle that
//! warns on drop if the caller forgot to ack or nack it. Two adapters
//! implement it — an in-memory one for single-process/dev/test use and
//! a Redis-backed one (sorted set + processing hash) for cluster
//! deployments.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_queue;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use memory::MemoryQueue;
#[cfg(feature = "redis-backend")]
pub use redis_queue::RedisQueue;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("delivery handle already consumed")]
    AlreadyConsumed,
}

/// A delivered job plus the means to acknowledge or fail it. Must be
/// consumed via [`Delivery::ack`] or [`Delivery::nack`]; dropping it
/// without either logs a warning and nacks it as a safety net so the job
/// is never silently lost. A worker process that crashes outright (no
/// `Drop` runs) relies on [`WorkQueue::reconcile`] instead, which sweeps
/// entries whose visibility timeout lapsed.
pub struct Delivery<T> {
    pub payload: T,
    consumed: bool,
    ack_fn: Option<Box<dyn FnOnce(bool) + Send>>,
}

impl<T> Delivery<T> {
    fn new(payload: T, ack_fn: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            payload,
            consumed: false,
            ack_fn: Some(Box::new(ack_fn)),
        }
    }

    /// Mark the job done; it will not be redelivered.
    pub fn ack(mut self) {
        self.consumed = true;
        if let Some(f) = self.ack_fn.take() {
            f(true);
        }
    }

    /// Give up on the job for now; it becomes visible again immediately
    /// so another worker (or a future re-enqueue with a delay) can pick
    /// it up. Callers that want a jittered requeue delay should use
    /// [`WorkQueue::enqueue_after`] instead of relying on this.
    pub fn nack(mut self) {
        self.consumed = true;
        if let Some(f) = self.ack_fn.take() {
            f(false);
        }
    }
}

impl<T> Drop for Delivery<T> {
    fn drop(&mut self) {
        if !self.consumed {
            tracing::warn!("delivery dropped without ack or nack; job will be redelivered after its visibility timeout");
            if let Some(f) = self.ack_fn.take() {
                f(false);
            }
        }
    }
}

/// Job queue contract shared by the discovery queue and the analysis
/// queue. Implementations provide at-least-once delivery semantics.
#[async_trait]
pub trait WorkQueue<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Enqueue a job for immediate delivery.
    async fn enqueue(&self, payload: T) -> Result<(), QueueError>;

    /// Enqueue a job to become visible only after `delay_secs`, used for
    /// the analyzer's admission-denied requeue.
    async fn enqueue_after(&self, payload: T, delay_secs: u64) -> Result<(), QueueError>;

    /// Claim the next visible job, if any, making it invisible for
    /// `visibility_timeout_secs`.
    async fn claim(&self, visibility_timeout_secs: u64) -> Result<Option<Delivery<T>>, QueueError>;

    /// Number of jobs currently visible (not claimed).
    async fn ready_len(&self) -> Result<usize, QueueError>;

    /// Number of jobs currently claimed and invisible.
    async fn in_flight_len(&self) -> Result<usize, QueueError>;

    /// Sweep for jobs whose visibility timeout lapsed and return them to
    /// the ready set. Backends that expire entries lazily on `claim`
    /// may implement this as a no-op.
    async fn reconcile(&self) -> Result<usize, QueueError>;
}
