mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forge", version)]
#[command(about = "Provision, deploy and tear down a StackForge cloud topology", long_about = None)]
struct Cli {
    /// Path to stackforge.yaml (searched for when omitted)
    #[arg(short, long, global = true, env = "STACKFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every missing resource, resuming after the last recorded step
    Provision,
    /// Upload the frontend bundle and update function code
    Deploy,
    /// Delete every recorded resource in reverse order
    Teardown {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the recorded resources and what provision would do
    Status,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let loaded = stackforge_config::load_config(cli.config.as_deref())?;
    tracing::debug!("Using configuration {}", loaded.path.display());

    match cli.command {
        Commands::Provision => commands::provision::handle(&loaded).await,
        Commands::Deploy => commands::deploy::handle(&loaded).await,
        Commands::Teardown { yes } => commands::teardown::handle(&loaded, yes).await,
        Commands::Status => commands::status::handle(&loaded).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
