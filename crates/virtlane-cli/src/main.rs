//! virtlane CLI entry point.
//!
//! Configuration comes from `VIRTLANE_*` environment variables (see
//! [`DriverConfig::from_env`]). Logs go to stderr; stdout carries only
//! command results.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use virtlane_core::{Driver, DriverConfig};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `virtlane` also matches the `virtlane_core` and `virtlane_hypervisor` targets.
    let filter = if cli.debug { "virtlane=debug" } else { "virtlane=info" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = DriverConfig::from_env();
    tracing::debug!(?config, "Configuration loaded");

    let driver = Driver::new(config)?;

    match cli.command {
        Commands::State { id } => commands::state(&driver, &id).await,
        Commands::Address { id, wait } => commands::address(&driver, &id, wait).await,
        Commands::Snapshot(cmd) => commands::snapshot(&driver, cmd).await,
    }
}
