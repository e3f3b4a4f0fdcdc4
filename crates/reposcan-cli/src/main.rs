mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.is_verbose());

    match cli.command {
        Commands::Init => cli::commands::init::cmd_init(cli.config.as_deref()).await,
        Commands::Submit { action } => cli::commands::submit::cmd_submit(action, cli.config.as_deref()).await,
        Commands::Discover { action } => cli::commands::discover::cmd_discover(action, cli.config.as_deref()).await,
        Commands::Analyze => cli::commands::analyze::cmd_analyze(cli.config.as_deref()).await,
        Commands::Admin { action } => cli::commands::admin::cmd_admin(action, cli.config.as_deref()).await,
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "reposcan=debug" } else { "reposcan=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();
}
