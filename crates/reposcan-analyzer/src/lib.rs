//! reposcan-analyzer — clones a repository, recovers history a plain
//! checkout can't show, runs both scanners over everything recovered,
//! and enforces the pipeline semaphore around the whole job.

pub mod clone;
pub mod scanner;
pub mod worker;

pub use worker::{AnalyzerWorker, AnalyzerWorkerError};
