use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use reposcan_core::hosting::GhClient;
use reposcan_discovery::recon::recon_org;
use reposcan_discovery::worker::RepoFilter;
use reposcan_discovery::DiscoveryWorker;

use crate::cli::backends;

use super::helpers::load_settings;

#[derive(Debug, Subcommand)]
pub enum DiscoverAction {
    /// Run the discovery worker loop (consumes the discovery queue).
    Run,
    /// Read-only org recon: stars/forks/languages/commit-count summary
    /// per organization, written as JSON. Does not touch any queue.
    Recon {
        /// One org name per line.
        #[arg(long)]
        orgs_file: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 500)]
        max_repos_per_org: usize,
    },
}

pub async fn cmd_discover(action: DiscoverAction, config_path: Option<&std::path::Path>) -> Result<()> {
    match action {
        DiscoverAction::Run => cmd_discover_run(config_path).await,
        DiscoverAction::Recon { orgs_file, output, max_repos_per_org } => {
            cmd_discover_recon(&orgs_file, &output, max_repos_per_org).await
        }
    }
}

async fn cmd_discover_run(config_path: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let cache = backends::build_cache(&settings)?;
    let analysis_queue = backends::build_analysis_queue(&settings)?;
    let discovery_queue = backends::build_discovery_queue(&settings)?;

    let worker = Arc::new(DiscoveryWorker::new(
        GhClient::new(),
        cache,
        analysis_queue,
        settings.max_repos_per_org,
        RepoFilter {
            max_repo_age_days: settings.max_repo_age_days,
            max_repo_size_kb: settings.max_repo_size_kb,
        },
    ));

    tracing::info!("discovery worker starting");
    worker.run(discovery_queue, 3 * 3600, 5).await;
    Ok(())
}

async fn cmd_discover_recon(orgs_file: &std::path::Path, output: &std::path::Path, max_repos_per_org: usize) -> Result<()> {
    let text = std::fs::read_to_string(orgs_file)?;
    let orgs: Vec<&str> = text.lines().map(|l| l.trim()).filter(|l| !l.is_empty() && !l.starts_with('#')).collect();

    let gh = GhClient::new();
    let mut summaries = Vec::with_capacity(orgs.len());
    for org in orgs {
        tracing::info!(org, "running recon");
        match recon_org(&gh, org, max_repos_per_org).await {
            Ok(summary) => summaries.push(summary),
            Err(err) => tracing::warn!(org, %err, "recon failed for org, skipping"),
        }
    }

    let json = serde_json::to_string_pretty(&summaries)?;
    std::fs::write(output, json)?;
    println!("wrote recon summary for {} orgs to {}", summaries.len(), output.display());
    Ok(())
}
