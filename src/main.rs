//! Stemmix CLI - stem engine diagnostics
//!
//! Command-line entry point for probing stem loads and inspecting track
//! manifests.

use clap::Parser;
use env_logger::Env;
use log::info;

use stemmix::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Stemmix v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Probe {
            path,
            timeout,
            retries,
        }) => {
            commands::probe(&path, timeout, retries).await?;
        }
        Some(Commands::Manifest { path }) => {
            commands::print_manifest(&path)?;
        }
        None => {
            println!("Stemmix v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
