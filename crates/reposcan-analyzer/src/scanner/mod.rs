//! Scanner capability trait.
//!
//! TruffleHog and the regex heuristics are independent scanner
//! capabilities run separately over the same source tree, not one
//! scanner with an internal branch, so they're two implementations of
//! one trait here, the same way alternative backends sit behind a
//! single interface elsewhere in this workspace.

pub mod heuristics;
pub mod trufflehog;

use std::path::Path;

use async_trait::async_trait;
use reposcan_core::model::{Finding, SourceType};

pub use heuristics::HeuristicScanner;
pub use trufflehog::TruffleHogScanner;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error(transparent)]
    Command(#[from] reposcan_core::command::CommandError),
    #[error("scanner process failed: {0}")]
    Process(String),
    #[error("failed to parse scanner output: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One scan capability over a recovered source tree (a git clone, a
/// directory of restored deleted files, or a directory of recovered
/// dangling blobs).
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan `root` (already materialized on disk) and return every
    /// finding, tagged with `source_type` and `run_id` for correlation
    /// within a single analyzer run (never across repositories).
    async fn scan(
        &self,
        root: &Path,
        source_type: SourceType,
        org: &str,
        repo: &str,
        run_id: uuid::Uuid,
    ) -> Result<Vec<Finding>, ScannerError>;

    fn name(&self) -> &'static str;
}
