use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use reposcan_core::model::RepoRef;
use reposcan_core::submitter::Submitter;

use crate::cli::backends;

use super::helpers::load_settings;

fn submitting_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(message);
    bar
}

#[derive(Debug, Subcommand)]
pub enum SubmitAction {
    /// Submit a file of org names for org-list discovery.
    OrgList {
        /// One org name per line.
        #[arg(long)]
        file: PathBuf,
    },
    /// Submit a single hosted-search discovery query.
    Search {
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Submit a file of `org/repo` entries straight to the analysis queue.
    Direct {
        /// One `org/repo` per line.
        #[arg(long)]
        file: PathBuf,
    },
}

pub async fn cmd_submit(action: SubmitAction, config_path: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let semaphore = backends::build_semaphore(&settings)?;
    let discovery_queue = backends::build_discovery_queue(&settings)?;
    let analysis_queue = backends::build_analysis_queue(&settings)?;

    let submitter = Submitter::new(
        semaphore,
        discovery_queue,
        analysis_queue,
        settings.global_max_concurrent_pipelines,
        settings.admission_headroom,
        settings.submit_check_interval_secs,
        settings.submit_batch_size,
    );

    match action {
        SubmitAction::OrgList { file } => {
            let orgs = read_lines(&file)?;
            let bar = submitting_spinner(format!("submitting {} orgs for org-list discovery", orgs.len()));
            submitter.submit_org_list(&orgs).await?;
            bar.finish_with_message(format!("{} {} orgs submitted", style("✓").green(), orgs.len()));
        }
        SubmitAction::Search { query, limit } => {
            let bar = submitting_spinner(format!("submitting hosted-search discovery query {query:?} (limit {limit})"));
            submitter.submit_gh_search(query, limit).await?;
            bar.finish_with_message(format!("{} search job submitted", style("✓").green()));
        }
        SubmitAction::Direct { file } => {
            let lines = read_lines(&file)?;
            let repos: Vec<RepoRef> = lines.iter().filter_map(|l| RepoRef::parse(l)).collect();
            if repos.len() != lines.len() {
                tracing::warn!(
                    skipped = lines.len() - repos.len(),
                    "some lines in {} were not valid org/repo entries and were skipped",
                    file.display()
                );
            }
            let bar = submitting_spinner(format!("submitting {} repos directly to the analysis queue", repos.len()));
            submitter.submit_direct_repo_list(&repos).await?;
            bar.finish_with_message(format!("{} {} repos submitted", style("✓").green(), repos.len()));
        }
    }

    Ok(())
}

fn read_lines(path: &PathBuf) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}
