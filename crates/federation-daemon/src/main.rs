//! Federation daemon - keeps canonical content synchronized with its remote
//! network copies.

mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use federation_core::{init_logging, FederationConfig, Paths};

/// Federation daemon command-line interface.
#[derive(Parser)]
#[command(name = "federationd")]
#[command(about = "Synchronizes canonical content with remote federation networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config
    /// file when given.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, pid). Defaults
    /// to ~/.federationd
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run,
    /// Fetch one remote object and store it as local content
    Import {
        /// Remote reference: an at:// URI or an https:// object URL
        #[arg(long)]
        uri: String,
    },
    /// Reset mappings in the given status so the daemon retries them
    Resweep {
        /// Status to re-drive
        #[arg(long, value_parser = ["pending", "failed"], default_value = "failed")]
        status: String,
    },
    /// Show mapping counts by sync status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = FederationConfig::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Some(Commands::Run) | None => app::run_daemon(config, paths).await,
        Some(Commands::Import { uri }) => commands::import(&config, &paths, &uri).await,
        Some(Commands::Resweep { status }) => commands::resweep(&paths, &status),
        Some(Commands::Status) => commands::status(&paths),
    }
}
