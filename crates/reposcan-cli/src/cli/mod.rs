//! CLI surface: a global `-v/--verbose` plus `--config` flag, and a
//! `Commands` enum of subcommands, each delegating to its own module
//! under `commands/`.

pub mod backends;
pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "reposcan", version, about = "Distributed secret-hunting pipeline over public repositories")]
pub struct Cli {
    /// Path to a TOML config file overlaying the defaults.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Verbose logging (`reposcan=debug` instead of `reposcan=info`).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the on-disk output directory tree.
    Init,

    /// Submit work onto the discovery or analysis queue.
    Submit {
        #[command(subcommand)]
        action: commands::submit::SubmitAction,
    },

    /// Discovery worker loop, or a one-off org recon report.
    Discover {
        #[command(subcommand)]
        action: commands::discover::DiscoverAction,
    },

    /// Run the analyzer worker loop (consumes the analysis queue).
    Analyze,

    /// Operator commands: counter reconciliation, queue inspection.
    Admin {
        #[command(subcommand)]
        action: commands::admin::AdminAction,
    },
}
