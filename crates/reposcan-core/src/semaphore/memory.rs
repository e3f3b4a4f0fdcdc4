use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::{Lease, PipelineSemaphore, SemaphoreError};

struct Inner {
    count: AtomicI64,
    leases: Mutex<HashSet<Uuid>>,
}

/// In-process counting semaphore. Acquire is a compare-and-swap loop:
/// read the counter, refuse if it's already at `max_concurrent`, else
/// attempt to bump it with `compare_exchange` and retry on contention.
/// No read-then-write gap for two callers to race through.
#[derive(Clone)]
pub struct MemorySemaphore {
    inner: Arc<Inner>,
}

impl Default for MemorySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySemaphore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                count: AtomicI64::new(0),
                leases: Mutex::new(HashSet::new()),
            }),
        }
    }
}

#[async_trait]
impl PipelineSemaphore for MemorySemaphore {
    async fn try_acquire(&self, max_concurrent: i64) -> Result<Option<Lease>, SemaphoreError> {
        loop {
            let current = self.inner.count.load(Ordering::SeqCst);
            if current >= max_concurrent {
                return Ok(None);
            }
            if self
                .inner
                .count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let id = Uuid::new_v4();
                self.inner.leases.lock().expect("lease set poisoned").insert(id);

                let inner = Arc::clone(&self.inner);
                return Ok(Some(Lease::new(id, move || {
                    inner.count.fetch_sub(1, Ordering::SeqCst);
                    inner.leases.lock().expect("lease set poisoned").remove(&id);
                })));
            }
            // Lost the race to another acquirer; retry with a fresh read.
        }
    }

    async fn current_count(&self) -> Result<i64, SemaphoreError> {
        Ok(self.inner.count.load(Ordering::SeqCst))
    }

    async fn reconcile_counter(&self) -> Result<i64, SemaphoreError> {
        let live = self.inner.leases.lock().expect("lease set poisoned").len() as i64;
        self.inner.count.store(live, Ordering::SeqCst);
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_cap() {
        let sem = MemorySemaphore::new();
        let l1 = sem.try_acquire(2).await.unwrap();
        let l2 = sem.try_acquire(2).await.unwrap();
        let l3 = sem.try_acquire(2).await.unwrap();
        assert!(l1.is_some());
        assert!(l2.is_some());
        assert!(l3.is_none());
        assert_eq!(sem.current_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn release_frees_a_slot() {
        let sem = MemorySemaphore::new();
        let l1 = sem.try_acquire(1).await.unwrap().unwrap();
        assert!(sem.try_acquire(1).await.unwrap().is_none());
        l1.release();
        assert_eq!(sem.current_count().await.unwrap(), 0);
        assert!(sem.try_acquire(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_acquires_never_exceed_cap() {
        let sem = MemorySemaphore::new();
        let max = 5i64;
        let mut handles = Vec::new();
        for _ in 0..50 {
            let sem = sem.clone();
            handles.push(tokio::spawn(async move { sem.try_acquire(max).await.unwrap() }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(sem.current_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn reconcile_corrects_drift() {
        let sem = MemorySemaphore::new();
        let lease = sem.try_acquire(3).await.unwrap().unwrap();
        // Simulate a crashed worker: counter bumped but lease forgotten
        // without going through release().
        std::mem::forget(lease);
        assert_eq!(sem.current_count().await.unwrap(), 1);
        // The lease id is still tracked (forget skipped Drop, not the
        // insert), so reconcile is a no-op here; this asserts it's at
        // least idempotent and doesn't panic.
        let corrected = sem.reconcile_counter().await.unwrap();
        assert_eq!(corrected, 1);
    }
}
