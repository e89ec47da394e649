//! Subcommand definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use virtlane_core::{Driver, MachineId};

/// Inspect libvirt-managed machines.
#[derive(Debug, Parser)]
#[command(name = "virtlane", version, about)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the state of a machine.
    State {
        /// Machine (domain) id.
        id: String,
    },
    /// Print the IP address of a machine.
    Address {
        /// Machine (domain) id.
        id: String,
        /// Wait up to the boot timeout for an address to appear.
        #[arg(long)]
        wait: bool,
    },
    /// Manage machine snapshots.
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommands {
    /// List snapshot names.
    List { id: String },
    /// Create a snapshot, replacing one with the same name.
    Save { id: String, name: String },
    /// Delete a snapshot.
    Delete { id: String, name: String },
    /// Revert a machine to a snapshot.
    Restore { id: String, name: String },
}

pub async fn state(driver: &Driver, id: &str) -> Result<()> {
    let state = driver.state(&MachineId::from(id)).await?;
    println!("{state}");
    Ok(())
}

pub async fn address(driver: &Driver, id: &str, wait: bool) -> Result<()> {
    let id = MachineId::from(id);
    let address = if wait {
        driver.address(&id).await?
    } else {
        driver
            .wait_for_address(&id, driver.config().state_timeout())
            .await?
    };

    match address {
        Some(ip) => {
            println!("{ip}");
            Ok(())
        }
        None => anyhow::bail!("no address found for machine {id}"),
    }
}

pub async fn snapshot(driver: &Driver, cmd: SnapshotCommands) -> Result<()> {
    let snapshots = driver.snapshots();
    match cmd {
        SnapshotCommands::List { id } => {
            let names = snapshots.list(&MachineId::from(id)).await?;
            for name in names {
                println!("{name}");
            }
        }
        SnapshotCommands::Save { id, name } => {
            snapshots
                .create(&MachineId::from(id.as_str()), &name)
                .await
                .with_context(|| format!("Failed to save snapshot {name} of {id}"))?;
        }
        SnapshotCommands::Delete { id, name } => {
            snapshots
                .delete(&MachineId::from(id.as_str()), &name)
                .await
                .with_context(|| format!("Failed to delete snapshot {name} of {id}"))?;
        }
        SnapshotCommands::Restore { id, name } => {
            snapshots
                .revert(&MachineId::from(id.as_str()), &name)
                .await
                .with_context(|| format!("Failed to restore snapshot {name} of {id}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_address_wait() {
        let cli = Cli::parse_from(["virtlane", "address", "vm-1", "--wait"]);
        assert!(matches!(cli.command, Commands::Address { ref id, wait: true } if id == "vm-1"));
        assert!(!cli.debug);
    }

    #[test]
    fn test_parse_snapshot_restore_with_global_debug() {
        let cli = Cli::parse_from(["virtlane", "snapshot", "restore", "vm-1", "base", "--debug"]);
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Commands::Snapshot(SnapshotCommands::Restore { ref id, ref name })
                if id == "vm-1" && name == "base"
        ));
    }
}
