//! Analyzer worker: the full per-repo state machine.
//!
//! Admission check, clone-with-retries, deleted-file recovery, dangling
//! blob recovery, both scanners over everything recovered, and a
//! try/finally that always tears down the clone directory and releases
//! the semaphore slot regardless of outcome. The admission check itself
//! is [`reposcan_core::semaphore::PipelineSemaphore::try_acquire`], an
//! atomic compare-and-swap so two workers never both observe a free
//! slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use reposcan_core::cache::ProcessedCache;
use reposcan_core::command::CommandRunner;
use reposcan_core::git;
use reposcan_core::model::{AnalysisJob, Finding, SourceType};
use reposcan_core::queue::WorkQueue;
use reposcan_core::semaphore::PipelineSemaphore;

use crate::clone::clone_repo_with_retries;
use crate::scanner::Scanner;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerWorkerError {
    #[error(transparent)]
    Clone(#[from] crate::clone::CloneError),
    #[error(transparent)]
    Git(#[from] reposcan_core::git::history::GitError),
    #[error(transparent)]
    Scanner(#[from] crate::scanner::ScannerError),
    #[error(transparent)]
    Semaphore(#[from] reposcan_core::semaphore::SemaphoreError),
    #[error(transparent)]
    Queue(#[from] reposcan_core::queue::QueueError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one analysis job.
pub enum JobOutcome {
    /// The pipeline was at capacity; the job was re-enqueued with a
    /// delay rather than run.
    Requeued,
    /// The repo was analyzed; `findings` were written out.
    Analyzed { findings: usize },
}

pub struct AnalyzerWorkerConfig {
    pub global_max_concurrent_pipelines: i64,
    pub analyzer_requeue_delay_secs: u64,
    pub max_clone_attempts: u32,
    pub clone_retry_delay_secs: u64,
    pub repo_clone_timeout_secs: u64,
    pub scan_commit_depth: u64,
    pub cache_ttl_secs: u64,
    pub cloned_repos_dir: PathBuf,
    pub restored_files_dir: PathBuf,
    pub dangling_blobs_dir: PathBuf,
    pub trufflehog_results_dir: PathBuf,
    pub custom_regex_results_dir: PathBuf,
}

pub struct AnalyzerWorker {
    semaphore: Arc<dyn PipelineSemaphore>,
    cache: Arc<dyn ProcessedCache>,
    trufflehog: Arc<dyn Scanner>,
    heuristics: Arc<dyn Scanner>,
    runner: CommandRunner,
    config: AnalyzerWorkerConfig,
}

impl AnalyzerWorker {
    pub fn new(
        semaphore: Arc<dyn PipelineSemaphore>,
        cache: Arc<dyn ProcessedCache>,
        trufflehog: Arc<dyn Scanner>,
        heuristics: Arc<dyn Scanner>,
        config: AnalyzerWorkerConfig,
    ) -> Self {
        Self {
            semaphore,
            cache,
            trufflehog,
            heuristics,
            runner: CommandRunner::new(),
            config,
        }
    }

    /// Process one analysis job. On admission denial, re-enqueues the
    /// job onto `analysis_queue` itself (not the caller's job) with a
    /// jittered delay and returns [`JobOutcome::Requeued`] — the caller
    /// should still ack the original delivery.
    pub async fn process_job(
        &self,
        job: AnalysisJob,
        analysis_queue: &dyn WorkQueue<AnalysisJob>,
    ) -> Result<JobOutcome, AnalyzerWorkerError> {
        let Some(lease) = self.semaphore.try_acquire(self.config.global_max_concurrent_pipelines).await? else {
            let jitter: u64 = rand::thread_rng().gen_range(0..30);
            let delay = self.config.analyzer_requeue_delay_secs + jitter;
            let mut requeued = job;
            requeued.attempt_hint = Some(requeued.attempt_hint.unwrap_or(0) + 1);
            analysis_queue.enqueue_after(requeued, delay).await?;
            return Ok(JobOutcome::Requeued);
        };

        // try/finally equivalent: the clone directory is always removed
        // and the lease is always released, on every exit path,
        // including an early `?` return from analysis itself.
        let result = self.run_admitted_job(&job).await;

        let clone_dir = job.repo.safe_path(&self.config.cloned_repos_dir);
        let _ = tokio::fs::remove_dir_all(&clone_dir).await;
        lease.release();

        let findings_count = result?;
        self.cache
            .mark_processed(&job.repo.full_name(), self.config.cache_ttl_secs)
            .await
            .ok();

        Ok(JobOutcome::Analyzed { findings: findings_count })
    }

    /// Run the claim/process/ack loop against `analysis_queue` until
    /// cancelled. A requeue (admission denied) still acks the original
    /// delivery, since `process_job` already placed a fresh delayed job
    /// on the queue itself.
    pub async fn run(
        self: Arc<Self>,
        analysis_queue: Arc<dyn WorkQueue<AnalysisJob>>,
        visibility_timeout_secs: u64,
        poll_interval_secs: u64,
    ) {
        loop {
            match analysis_queue.claim(visibility_timeout_secs).await {
                Ok(Some(delivery)) => {
                    let job = delivery.payload.clone();
                    match self.process_job(job, analysis_queue.as_ref()).await {
                        Ok(JobOutcome::Analyzed { findings }) => {
                            tracing::info!(findings, "analysis job processed");
                            delivery.ack();
                        }
                        Ok(JobOutcome::Requeued) => {
                            tracing::info!("admission denied, job requeued with delay");
                            delivery.ack();
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "analysis job failed, will redeliver");
                            delivery.nack();
                        }
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(std::time::Duration::from_secs(poll_interval_secs)).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "analysis queue error");
                    tokio::time::sleep(std::time::Duration::from_secs(poll_interval_secs)).await;
                }
            }
        }
    }

    async fn run_admitted_job(&self, job: &AnalysisJob) -> Result<usize, AnalyzerWorkerError> {
        let clone_dir = job.repo.safe_path(&self.config.cloned_repos_dir);
        clone_repo_with_retries(
            &self.runner,
            &job.repo.clone_url(),
            &clone_dir,
            self.config.max_clone_attempts,
            self.config.clone_retry_delay_secs,
            self.config.repo_clone_timeout_secs,
            &std::collections::HashMap::new(),
        )
        .await?;

        let run_id = uuid::Uuid::new_v4();
        let mut all_findings = Vec::new();

        // Each sub-stage below stands alone: a failure recovering deleted
        // files or dangling blobs (or scanning what was recovered) is
        // logged and skipped rather than aborting the other sub-stages.
        match self.scan_source(&clone_dir, SourceType::LocalRepo, job, run_id).await {
            Ok(findings) => all_findings.extend(findings),
            Err(err) => tracing::warn!(repo = %job.repo.full_name(), error = %err, "local repo scan failed, skipping"),
        }

        match git::restore_deleted_files(&clone_dir, self.config.scan_commit_depth, &self.runner).await {
            Ok(restored) if !restored.is_empty() => {
                let restored_dir = job.repo.safe_path(&self.config.restored_files_dir);
                match self.materialize_and_scan(&restored_dir, SourceType::RestoredFiles, job, run_id, restored.into_iter().map(|f| {
                    (git::history::safe_restored_filename(&f.original_path), f.bytes)
                })).await {
                    Ok(findings) => all_findings.extend(findings),
                    Err(err) => tracing::warn!(repo = %job.repo.full_name(), error = %err, "restored-files scan failed, skipping"),
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(repo = %job.repo.full_name(), error = %err, "deleted-file restoration failed, skipping"),
        }

        match git::extract_dangling_blobs(&clone_dir, &self.runner).await {
            Ok(dangling) if !dangling.is_empty() => {
                let dangling_dir = job.repo.safe_path(&self.config.dangling_blobs_dir);
                match self.materialize_and_scan(&dangling_dir, SourceType::DanglingBlobs, job, run_id, dangling.into_iter().map(|b| {
                    (b.sha.clone(), b.bytes)
                })).await {
                    Ok(findings) => all_findings.extend(findings),
                    Err(err) => tracing::warn!(repo = %job.repo.full_name(), error = %err, "dangling-blob scan failed, skipping"),
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(repo = %job.repo.full_name(), error = %err, "dangling-blob extraction failed, skipping"),
        }

        self.write_findings(&all_findings).await?;
        Ok(all_findings.len())
    }

    async fn materialize_and_scan(
        &self,
        dir: &Path,
        source_type: SourceType,
        job: &AnalysisJob,
        run_id: uuid::Uuid,
        files: impl Iterator<Item = (String, Vec<u8>)>,
    ) -> Result<Vec<Finding>, AnalyzerWorkerError> {
        tokio::fs::create_dir_all(dir).await?;
        for (name, bytes) in files {
            tokio::fs::write(dir.join(name), &bytes).await?;
        }
        self.scan_source(dir, source_type, job, run_id).await
    }

    async fn scan_source(
        &self,
        root: &Path,
        source_type: SourceType,
        job: &AnalysisJob,
        run_id: uuid::Uuid,
    ) -> Result<Vec<Finding>, AnalyzerWorkerError> {
        let mut findings = self
            .trufflehog
            .scan(root, source_type, &job.repo.org, &job.repo.repo, run_id)
            .await?;
        findings.extend(
            self.heuristics
                .scan(root, source_type, &job.repo.org, &job.repo.repo, run_id)
                .await?,
        );
        Ok(findings)
    }

    async fn write_findings(&self, findings: &[Finding]) -> Result<(), AnalyzerWorkerError> {
        if findings.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.config.trufflehog_results_dir).await?;
        tokio::fs::create_dir_all(&self.config.custom_regex_results_dir).await?;

        let mut trufflehog_lines = String::new();
        let mut heuristic_lines = String::new();
        for finding in findings {
            let line = serde_json::to_string(finding).unwrap_or_default();
            if finding.detector == "custom_regex" || is_heuristic_detector(&finding.detector) {
                heuristic_lines.push_str(&line);
                heuristic_lines.push('\n');
            } else {
                trufflehog_lines.push_str(&line);
                trufflehog_lines.push('\n');
            }
        }

        let repo = findings[0].repo.clone();
        if !trufflehog_lines.is_empty() {
            let path = self.config.trufflehog_results_dir.join(format!("{repo}.jsonl"));
            tokio::fs::write(path, trufflehog_lines).await?;
        }
        if !heuristic_lines.is_empty() {
            let path = self.config.custom_regex_results_dir.join(format!("{repo}.jsonl"));
            tokio::fs::write(path, heuristic_lines).await?;
        }
        Ok(())
    }
}

fn is_heuristic_detector(detector: &str) -> bool {
    matches!(
        detector,
        "aws_access_key_id"
            | "generic_api_key_assignment"
            | "private_key_header"
            | "slack_token"
            | "github_pat"
            | "jwt_like"
            | "generic_password_assignment"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reposcan_core::cache::MemoryCache;
    use reposcan_core::model::RepoRef;
    use reposcan_core::queue::MemoryQueue;
    use reposcan_core::semaphore::MemorySemaphore;

    struct NullScanner;

    #[async_trait]
    impl Scanner for NullScanner {
        async fn scan(
            &self,
            _root: &Path,
            _source_type: SourceType,
            _org: &str,
            _repo: &str,
            _run_id: uuid::Uuid,
        ) -> Result<Vec<Finding>, crate::scanner::ScannerError> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    fn test_config(tmp: &tempfile::TempDir) -> AnalyzerWorkerConfig {
        AnalyzerWorkerConfig {
            global_max_concurrent_pipelines: 1,
            analyzer_requeue_delay_secs: 120,
            max_clone_attempts: 1,
            clone_retry_delay_secs: 0,
            repo_clone_timeout_secs: 5,
            scan_commit_depth: 0,
            cache_ttl_secs: 3600,
            cloned_repos_dir: tmp.path().join("cloned"),
            restored_files_dir: tmp.path().join("restored"),
            dangling_blobs_dir: tmp.path().join("dangling"),
            trufflehog_results_dir: tmp.path().join("th_results"),
            custom_regex_results_dir: tmp.path().join("regex_results"),
        }
    }

    #[tokio::test]
    async fn denied_admission_requeues_with_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let semaphore = Arc::new(MemorySemaphore::new());
        // Exhaust the single slot up front.
        let held = semaphore.try_acquire(1).await.unwrap().unwrap();

        let worker = AnalyzerWorker::new(
            semaphore,
            Arc::new(MemoryCache::new()),
            Arc::new(NullScanner),
            Arc::new(NullScanner),
            test_config(&tmp),
        );
        let queue = MemoryQueue::<AnalysisJob>::new();
        let job = AnalysisJob::new(RepoRef::new("acme", "foo"));
        let outcome = worker.process_job(job, &queue).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Requeued));
        assert_eq!(queue.ready_len().await.unwrap(), 0); // still delayed
        held.release();
    }
}
