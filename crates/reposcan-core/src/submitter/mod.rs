//! Front door that feeds jobs into the discovery and analysis queues
//! without letting the cluster admit more concurrent analyses than
//! `global_max_concurrent_pipelines`, and without letting either queue
//! grow unbounded ahead of what the analyzer workers can drain.
//!
//! Three submission modes, each with its own admission-wait loop
//! tightness: org-list submission is the most lenient (tolerates
//! `max + headroom` in flight), direct repo-list submission is the
//! strictest (never exceeds the hard cap).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::model::{AnalysisJob, DiscoveryJob, RepoRef};
use crate::queue::{QueueError, WorkQueue};
use crate::semaphore::{PipelineSemaphore, SemaphoreError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Semaphore(#[from] SemaphoreError),
}

pub struct Submitter {
    semaphore: Arc<dyn PipelineSemaphore>,
    discovery_queue: Arc<dyn WorkQueue<DiscoveryJob>>,
    analysis_queue: Arc<dyn WorkQueue<AnalysisJob>>,
    global_max_concurrent_pipelines: i64,
    /// Extra in-flight headroom the lenient admission checks tolerate.
    admission_headroom: i64,
    check_interval_secs: u64,
    batch_size: usize,
}

impl Submitter {
    pub fn new(
        semaphore: Arc<dyn PipelineSemaphore>,
        discovery_queue: Arc<dyn WorkQueue<DiscoveryJob>>,
        analysis_queue: Arc<dyn WorkQueue<AnalysisJob>>,
        global_max_concurrent_pipelines: i64,
        admission_headroom: i64,
        check_interval_secs: u64,
        batch_size: usize,
    ) -> Self {
        Self {
            semaphore,
            discovery_queue,
            analysis_queue,
            global_max_concurrent_pipelines,
            admission_headroom,
            check_interval_secs,
            batch_size,
        }
    }

    async fn combined_queue_len(&self) -> Result<usize, SubmitError> {
        Ok(self.discovery_queue.ready_len().await? + self.analysis_queue.ready_len().await?)
    }

    async fn sleep_jittered(&self) {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..5.0);
        let delay = self.check_interval_secs as f64 * 0.5 + jitter;
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    /// Submit org-list discovery jobs in batches of `batch_size`,
    /// pausing between batches while either the cluster is within
    /// `headroom` of capacity or the combined queue backlog exceeds
    /// `2 * target_analyzer_buffer` (`2 * global_max_concurrent_pipelines`).
    pub async fn submit_org_list(&self, orgs: &[String]) -> Result<(), SubmitError> {
        let target_buffer = self.global_max_concurrent_pipelines * 2;
        for chunk in orgs.chunks(self.batch_size) {
            loop {
                let active = self.semaphore.current_count().await?;
                let combined = self.combined_queue_len().await? as i64;
                let admitted = active < self.global_max_concurrent_pipelines + self.admission_headroom
                    && combined < target_buffer * 2;
                if admitted {
                    break;
                }
                self.sleep_jittered().await;
            }
            self.discovery_queue
                .enqueue(DiscoveryJob::OrgList { orgs: chunk.to_vec() })
                .await?;
            // Same thundering-herd guard as the per-repo pause below, at
            // batch granularity.
            let pause_ms = rand::thread_rng().gen_range(500..1500);
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        }
        Ok(())
    }

    /// Submit a single hosted-search discovery job, gated by the same
    /// lenient admission check as org-list submission.
    pub async fn submit_gh_search(&self, query: String, limit: usize) -> Result<(), SubmitError> {
        let target_buffer = self.global_max_concurrent_pipelines * 2;
        loop {
            let active = self.semaphore.current_count().await?;
            let combined = self.combined_queue_len().await? as i64;
            let admitted = active < self.global_max_concurrent_pipelines + self.admission_headroom
                && combined < target_buffer * 2;
            if admitted {
                break;
            }
            self.sleep_jittered().await;
        }
        self.discovery_queue
            .enqueue(DiscoveryJob::Search { query, limit })
            .await
    }

    /// Submit repos straight to the analysis queue, bypassing discovery
    /// entirely. Strictest admission check of the three: never exceeds
    /// the hard cap, and only tolerates being exactly at the cap if the
    /// analyzer queue has fallen to less than half the target buffer.
    pub async fn submit_direct_repo_list(&self, repos: &[RepoRef]) -> Result<(), SubmitError> {
        let target_buffer = self.global_max_concurrent_pipelines * 2;
        for repo in repos {
            loop {
                let active = self.semaphore.current_count().await?;
                let analyzer_len = self.analysis_queue.ready_len().await? as i64;
                let admitted = active < self.global_max_concurrent_pipelines
                    || (active == self.global_max_concurrent_pipelines && analyzer_len < target_buffer / 2);
                if admitted {
                    break;
                }
                self.sleep_jittered().await;
            }
            self.analysis_queue
                .enqueue(AnalysisJob::new(repo.clone()))
                .await?;
            // Small per-item pause so a big repo list doesn't hammer the
            // queue backend in a tight loop.
            let pause_ms = rand::thread_rng().gen_range(50..200);
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::queue::MemoryQueue;
    use crate::semaphore::MemorySemaphore;

    fn submitter_with_cap(cap: i64) -> (Submitter, Arc<MemoryQueue<DiscoveryJob>>, Arc<MemoryQueue<AnalysisJob>>) {
        let sem = Arc::new(MemorySemaphore::new());
        let disc_q = Arc::new(MemoryQueue::<DiscoveryJob>::new());
        let an_q = Arc::new(MemoryQueue::<AnalysisJob>::new());
        let submitter = Submitter::new(
            sem,
            disc_q.clone(),
            an_q.clone(),
            cap,
            5,
            1, // keep check interval tiny so tests don't hang
            20,
        );
        let _ = MemoryCache::new(); // grounding no-op: cache not used by submitter directly
        (submitter, disc_q, an_q)
    }

    #[tokio::test]
    async fn submit_org_list_enqueues_one_job_per_batch() {
        let (submitter, disc_q, _an_q) = submitter_with_cap(10);
        let orgs: Vec<String> = (0..45).map(|i| format!("org{i}")).collect();
        submitter.submit_org_list(&orgs).await.unwrap();
        // batch_size 20 over 45 orgs -> 3 batches -> 3 enqueued jobs.
        assert_eq!(disc_q.ready_len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn submit_direct_repo_list_enqueues_each_repo() {
        let (submitter, _disc_q, an_q) = submitter_with_cap(10);
        let repos = vec![RepoRef::new("acme", "foo"), RepoRef::new("acme", "bar")];
        submitter.submit_direct_repo_list(&repos).await.unwrap();
        assert_eq!(an_q.ready_len().await.unwrap(), 2);
    }
}
