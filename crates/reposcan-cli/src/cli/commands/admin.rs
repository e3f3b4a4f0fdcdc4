use anyhow::Result;
use clap::Subcommand;

use crate::cli::backends;

use super::helpers::load_settings;

#[derive(Debug, Subcommand)]
pub enum AdminAction {
    /// Recount live `pipeline:lease:*` sentinels and correct the active
    /// pipeline counter, undoing drift left by workers that crashed
    /// without releasing their semaphore slot.
    ReconcileCounter,
    /// Print queue depths and the current admission counter.
    Status,
}

pub async fn cmd_admin(action: AdminAction, config_path: Option<&std::path::Path>) -> Result<()> {
    let settings = load_settings(config_path)?;

    match action {
        AdminAction::ReconcileCounter => {
            let semaphore = backends::build_semaphore(&settings)?;
            let corrected = semaphore.reconcile_counter().await?;
            println!("active pipeline counter reconciled to {corrected}");
        }
        AdminAction::Status => {
            let semaphore = backends::build_semaphore(&settings)?;
            let discovery_queue = backends::build_discovery_queue(&settings)?;
            let analysis_queue = backends::build_analysis_queue(&settings)?;
            let cache = backends::build_cache(&settings)?;

            println!("active pipelines:    {}", semaphore.current_count().await?);
            println!("discovery queue:     {} ready", discovery_queue.ready_len().await?);
            println!("analysis queue:      {} ready, {} in flight", analysis_queue.ready_len().await?, analysis_queue.in_flight_len().await?);
            println!("processed (audit):   {}", cache.audit_count().await?);
        }
    }
    Ok(())
}
