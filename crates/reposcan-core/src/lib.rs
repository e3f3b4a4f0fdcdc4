//! reposcan-core — pipeline control plane shared by every reposcan worker.
//!
//! This crate has no notion of "organization" or "secret" beyond plain data
//! types: it is the admission-controlled job pipeline infrastructure
//! (command runner, queue adapter, pipeline semaphore, processed-repo
//! cache, git history walker, hosting-tool wrapper, submitter) that the
//! discovery and analyzer workers build on.

pub mod cache;
pub mod command;
pub mod config;
pub mod git;
pub mod hosting;
pub mod model;
pub mod queue;
pub mod semaphore;
pub mod submitter;

pub use model::{AnalysisJob, DiscoveryJob, Finding, RepoMetadata, RepoRef, SourceType};
