//! Host-side neighbour (ARP) table lookup.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Looks up addresses the host has seen for a MAC address.
#[async_trait]
pub trait NeighborLookup: Send + Sync {
    /// Raw lookup output: one address per line, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself could not run; an empty result
    /// means the table has no entry yet.
    async fn lookup(&self, mac: &str) -> Result<String>;
}

/// Runs a shell command with `$mac` substituted.
#[derive(Debug, Clone)]
pub struct CommandNeighborLookup {
    command: String,
}

impl CommandNeighborLookup {
    /// Wrap a command template such as `awk "/$mac/ {print \$1}" /proc/net/arp`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The command with `mac` substituted for `$mac`.
    pub fn render(&self, mac: &str) -> String {
        self.command.replace("$mac", mac)
    }
}

#[async_trait]
impl NeighborLookup for CommandNeighborLookup {
    async fn lookup(&self, mac: &str) -> Result<String> {
        if !is_mac(mac) {
            return Err(CoreError::NeighborLookup(format!("invalid MAC address: {mac}")));
        }
        let command = self.render(mac);
        tracing::trace!(command = %command, "Running neighbour lookup");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::NeighborLookup(format!("failed to spawn lookup: {e}")))?;

        if !output.status.success() {
            return Err(CoreError::NeighborLookup(format!(
                "lookup exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// Guards the shell substitution: only hex digits and colons reach `sh -c`.
fn is_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}
