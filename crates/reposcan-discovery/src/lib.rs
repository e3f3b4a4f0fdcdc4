//! reposcan-discovery — expands org lists and hosted searches into
//! analysis jobs for the analyzer queue.

pub mod recon;
pub mod worker;

pub use worker::{DiscoveryWorker, DiscoveryWorkerError};
