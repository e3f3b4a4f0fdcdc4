use std::sync::Arc;

use anyhow::Result;
use reposcan_analyzer::scanner::{HeuristicScanner, TruffleHogScanner};
use reposcan_analyzer::worker::AnalyzerWorkerConfig;
use reposcan_analyzer::AnalyzerWorker;
use reposcan_core::command::CommandRunner;

use crate::cli::backends;

use super::helpers::load_settings;

pub async fn cmd_analyze(config_path: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let semaphore = backends::build_semaphore(&settings)?;
    let cache = backends::build_cache(&settings)?;
    let analysis_queue = backends::build_analysis_queue(&settings)?;

    let trufflehog = Arc::new(TruffleHogScanner::new(
        CommandRunner::new(),
        settings.scanner_timeout_secs,
        settings.scan_commit_depth,
    ));
    let heuristics = Arc::new(HeuristicScanner::new(
        settings.denylist_extensions.clone(),
        settings.max_file_size_to_scan_bytes,
    ));

    let config = AnalyzerWorkerConfig {
        global_max_concurrent_pipelines: settings.global_max_concurrent_pipelines,
        analyzer_requeue_delay_secs: settings.analyzer_requeue_delay_secs,
        max_clone_attempts: settings.max_clone_attempts,
        clone_retry_delay_secs: settings.clone_retry_delay_secs,
        repo_clone_timeout_secs: settings.repo_clone_timeout_secs,
        scan_commit_depth: settings.scan_commit_depth,
        cache_ttl_secs: settings.cache_ttl_secs,
        cloned_repos_dir: settings.cloned_repos_dir(),
        restored_files_dir: settings.restored_files_dir(),
        dangling_blobs_dir: settings.dangling_blobs_dir(),
        trufflehog_results_dir: settings.trufflehog_results_dir(),
        custom_regex_results_dir: settings.custom_regex_results_dir(),
    };

    let worker = Arc::new(AnalyzerWorker::new(semaphore, cache, trufflehog, heuristics, config));

    tracing::info!("analyzer worker starting");
    worker.run(analysis_queue, settings.repo_clone_timeout_secs + settings.scanner_timeout_secs, 5).await;
    Ok(())
}
