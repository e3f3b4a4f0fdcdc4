//! Cluster-wide admission control.
//!
//! A naive implementation reads the counter, compares it to the limit,
//! and only then increments it — three separate round trips with a race
//! between them. Here, acquire is a single atomic compare-and-swap
//! (in-process, or a Lua script server-side for Redis) so two workers
//! can never both observe "one slot free" and both take it.
//!
//! Crash recovery uses lease sentinels: every successful acquire writes a
//! short-TTL `pipeline:lease:{uuid}` key alongside the increment. A
//! worker that crashes mid-job leaves its counter increment unmatched by
//! a decrement, but its lease key expires on its own; `reconcile_counter`
//! recounts live leases and corrects the counter to match, so drift is
//! bounded by the lease TTL rather than unbounded.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_semaphore;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemorySemaphore;
#[cfg(feature = "redis-backend")]
pub use redis_semaphore::RedisSemaphore;

#[derive(Debug, thiserror::Error)]
pub enum SemaphoreError {
    #[error("semaphore backend error: {0}")]
    Backend(String),
}

/// A held slot. Dropping it without calling [`Lease::release`] leaves
/// the lease sentinel to expire on its own — the counter will drift
/// high until `reconcile_counter` or the sentinel's TTL catches up, but
/// never drifts low (no legitimate admission is ever lost).
pub struct Lease {
    pub id: Uuid,
    release_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl Lease {
    fn new(id: Uuid, release_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release_fn: Some(Box::new(release_fn)),
        }
    }

    pub fn release(mut self) {
        if let Some(f) = self.release_fn.take() {
            f();
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(f) = self.release_fn.take() {
            f();
        }
    }
}

/// Cluster-wide counting semaphore bounding how many analyses run at
/// once, independent of which process or host runs them.
#[async_trait]
pub trait PipelineSemaphore: Send + Sync {
    /// Attempt to acquire one slot out of `max_concurrent`. Returns
    /// `None` if the pipeline is already at capacity.
    async fn try_acquire(&self, max_concurrent: i64) -> Result<Option<Lease>, SemaphoreError>;

    /// Current counter value, for operator visibility and the
    /// submitter's admission-wait loop.
    async fn current_count(&self) -> Result<i64, SemaphoreError>;

    /// Recount active lease sentinels and correct the counter to match,
    /// undoing drift left behind by crashed workers. Returns the
    /// corrected counter value.
    async fn reconcile_counter(&self) -> Result<i64, SemaphoreError>;
}
