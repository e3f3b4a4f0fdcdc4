use std::collections::{BinaryHeap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::{Delivery, QueueError, WorkQueue};

#[derive(Eq, PartialEq)]
struct ReadyEntry {
    deliver_at: Instant,
    seq: u64,
    id: u64,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deliver_at
        // (and, as a tiebreak, the lowest seq for FIFO-ish ordering)
        // comes out first.
        other
            .deliver_at
            .cmp(&self.deliver_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct InFlightEntry {
    payload: serde_json::Value,
    invisible_until: Instant,
}

struct Inner {
    ready_heap: BinaryHeap<ReadyEntry>,
    payloads: HashMap<u64, serde_json::Value>,
    in_flight: HashMap<u64, InFlightEntry>,
    next_seq: u64,
    next_id: u64,
}

/// In-memory, single-process implementation of [`WorkQueue`], backed by a
/// `BinaryHeap` ordered by delivery time. Suitable for dev, tests, and a
/// single-worker deployment; does not coordinate across processes.
pub struct MemoryQueue<T> {
    inner: Arc<Mutex<Inner>>,
    _marker: PhantomData<T>,
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ready_heap: BinaryHeap::new(),
                payloads: HashMap::new(),
                in_flight: HashMap::new(),
                next_seq: 0,
                next_id: 0,
            })),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for MemoryQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> WorkQueue<T> for MemoryQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn enqueue(&self, payload: T) -> Result<(), QueueError> {
        self.enqueue_after(payload, 0).await
    }

    async fn enqueue_after(&self, payload: T, delay_secs: u64) -> Result<(), QueueError> {
        let value = serde_json::to_value(&payload)?;
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.payloads.insert(id, value);
        inner.ready_heap.push(ReadyEntry {
            deliver_at: Instant::now() + Duration::from_secs(delay_secs),
            seq,
            id,
        });
        Ok(())
    }

    async fn claim(&self, visibility_timeout_secs: u64) -> Result<Option<Delivery<T>>, QueueError> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let now = Instant::now();
        let Some(top) = guard.ready_heap.peek() else {
            return Ok(None);
        };
        if top.deliver_at > now {
            return Ok(None);
        }
        let entry = guard.ready_heap.pop().expect("peeked entry must pop");
        let value = guard
            .payloads
            .remove(&entry.id)
            .expect("payload missing for ready entry");
        let payload: T = serde_json::from_value(value.clone())?;
        guard.in_flight.insert(
            entry.id,
            InFlightEntry {
                payload: value,
                invisible_until: now + Duration::from_secs(visibility_timeout_secs),
            },
        );
        drop(guard);

        let inner = Arc::clone(&self.inner);
        let id = entry.id;
        let delivery = Delivery::new(payload, move |acked| {
            let mut guard = inner.lock().expect("queue mutex poisoned");
            if let Some(entry) = guard.in_flight.remove(&id) {
                if !acked {
                    let seq = guard.next_seq;
                    guard.next_seq += 1;
                    guard.payloads.insert(id, entry.payload);
                    guard.ready_heap.push(ReadyEntry {
                        deliver_at: Instant::now(),
                        seq,
                        id,
                    });
                }
            }
        });
        Ok(Some(delivery))
    }

    async fn ready_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().expect("queue mutex poisoned").ready_heap.len())
    }

    async fn in_flight_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().expect("queue mutex poisoned").in_flight.len())
    }

    async fn reconcile(&self) -> Result<usize, QueueError> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let now = Instant::now();
        let expired: Vec<u64> = guard
            .in_flight
            .iter()
            .filter(|(_, e)| e.invisible_until <= now)
            .map(|(id, _)| *id)
            .collect();
        let count = expired.len();
        for id in expired {
            let entry = guard.in_flight.remove(&id).expect("id came from in_flight");
            let seq = guard.next_seq;
            guard.next_seq += 1;
            guard.payloads.insert(id, entry.payload);
            guard.ready_heap.push(ReadyEntry {
                deliver_at: now,
                seq,
                id,
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_claim_roundtrips_payload() {
        let q: MemoryQueue<String> = MemoryQueue::new();
        q.enqueue("acme/foo".to_string()).await.unwrap();
        let d = q.claim(30).await.unwrap().unwrap();
        assert_eq!(d.payload, "acme/foo");
        d.ack();
        assert_eq!(q.ready_len().await.unwrap(), 0);
        assert_eq!(q.in_flight_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_makes_job_immediately_visible_again() {
        let q: MemoryQueue<String> = MemoryQueue::new();
        q.enqueue("acme/foo".to_string()).await.unwrap();
        let d = q.claim(30).await.unwrap().unwrap();
        d.nack();
        assert_eq!(q.ready_len().await.unwrap(), 1);
        let d2 = q.claim(30).await.unwrap().unwrap();
        assert_eq!(d2.payload, "acme/foo");
    }

    #[tokio::test]
    async fn delayed_enqueue_is_not_immediately_visible() {
        let q: MemoryQueue<String> = MemoryQueue::new();
        q.enqueue_after("acme/foo".to_string(), 60).await.unwrap();
        assert!(q.claim(30).await.unwrap().is_none());
        assert_eq!(q.ready_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_delivery_is_redelivered_after_reconcile() {
        let q: MemoryQueue<String> = MemoryQueue::new();
        q.enqueue("acme/foo".to_string()).await.unwrap();
        {
            let d = q.claim(0).await.unwrap().unwrap();
            drop(d);
        }
        // visibility_timeout_secs = 0 means already expired.
        let swept = q.reconcile().await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(q.ready_len().await.unwrap(), 1);
    }
}
