//! Snapshot management.
//!
//! Every operation resolves the domain fresh by machine id. Failures are
//! wrapped in the operation's own error kind so callers can tell a failed
//! list from a failed revert.

use crate::connection::ConnectionManager;
use crate::error::{CoreError, Result};
use crate::machine::MachineId;
use std::sync::Arc;
use virtlane_hypervisor::{Domain, DomainSnapshot};

/// Description recorded on every snapshot virtlane creates.
pub const SNAPSHOT_DESCRIPTION: &str = "Snapshot created by virtlane";

/// Create, list, delete and revert named domain snapshots.
pub struct SnapshotManager {
    connections: Arc<ConnectionManager>,
}

impl SnapshotManager {
    /// Create a snapshot manager.
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Create the snapshot `name`, replacing any existing snapshot with that name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotCreation`] if the snapshot cannot be
    /// created. A failure to delete the previous snapshot is logged and
    /// otherwise ignored.
    pub async fn create(&self, id: &MachineId, name: &str) -> Result<()> {
        let creation = |source: CoreError| CoreError::SnapshotCreation {
            name: name.to_string(),
            source: Box::new(source),
        };

        match self.get_if_exists(id, name).await {
            Ok(_) => {
                tracing::debug!(machine_id = %id, snapshot = %name, "Replacing existing snapshot");
                match self.delete(id, name).await {
                    Ok(()) => {}
                    Err(e @ CoreError::SnapshotDeletion { .. }) => {
                        tracing::warn!(
                            machine_id = %id,
                            snapshot = %name,
                            error = %e,
                            "Could not delete existing snapshot, continuing"
                        );
                    }
                    Err(e) => return Err(creation(e)),
                }
            }
            Err(CoreError::SnapshotMissing { .. }) => {}
            Err(e) => return Err(creation(e)),
        }

        let domain = self.domain(id).await.map_err(creation)?;
        domain
            .snapshot_create(&snapshot_xml(name))
            .await
            .map_err(|e| creation(e.into()))?;

        tracing::info!(machine_id = %id, snapshot = %name, "Snapshot created");
        Ok(())
    }

    /// Names of the machine's snapshots, in hypervisor order.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`CoreError::SnapshotList`].
    pub async fn list(&self, id: &MachineId) -> Result<Vec<String>> {
        let names = async {
            let domain = self.domain(id).await?;
            Ok::<_, CoreError>(domain.snapshot_list_names().await?)
        }
        .await
        .map_err(|source| CoreError::SnapshotList {
            source: Box::new(source),
        })?;

        tracing::debug!(machine_id = %id, count = names.len(), "Snapshots listed");
        Ok(names)
    }

    /// Delete the snapshot `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotDeletion`] if the snapshot does not exist
    /// or cannot be deleted.
    pub async fn delete(&self, id: &MachineId, name: &str) -> Result<()> {
        async {
            let domain = self.domain(id).await?;
            let snapshot = find_snapshot(domain.as_ref(), name).await?;
            snapshot.delete().await?;
            Ok::<_, CoreError>(())
        }
        .await
        .map_err(|source| CoreError::SnapshotDeletion {
            name: name.to_string(),
            source: Box::new(source),
        })?;

        tracing::info!(machine_id = %id, snapshot = %name, "Snapshot deleted");
        Ok(())
    }

    /// Revert the machine to the snapshot `name`.
    ///
    /// The revert is always forced: hypervisors may otherwise refuse to
    /// revert across some state transitions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotReversion`], wrapping
    /// [`CoreError::SnapshotMissing`] when no such snapshot exists.
    pub async fn revert(&self, id: &MachineId, name: &str) -> Result<()> {
        async {
            let domain = self.domain(id).await?;
            let snapshot = find_snapshot(domain.as_ref(), name).await?;
            domain.revert_to_snapshot(snapshot.as_ref(), true).await?;
            Ok::<_, CoreError>(())
        }
        .await
        .map_err(|source| CoreError::SnapshotReversion {
            name: name.to_string(),
            source: Box::new(source),
        })?;

        tracing::info!(machine_id = %id, snapshot = %name, "Reverted to snapshot");
        Ok(())
    }

    /// The snapshot `name`, if it exists and its descriptor is readable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotMissing`] when the snapshot cannot be
    /// found or read; domain lookup failures are returned as they are.
    pub async fn get_if_exists(
        &self,
        id: &MachineId,
        name: &str,
    ) -> Result<Box<dyn DomainSnapshot>> {
        let domain = self.domain(id).await?;
        find_snapshot(domain.as_ref(), name).await
    }

    async fn domain(&self, id: &MachineId) -> Result<Box<dyn Domain>> {
        self.connections
            .lookup_domain(id)
            .await?
            .ok_or_else(|| CoreError::DomainNotFound(id.clone()))
    }
}

/// Look up a snapshot and read its descriptor; any failure means missing.
async fn find_snapshot(domain: &dyn Domain, name: &str) -> Result<Box<dyn DomainSnapshot>> {
    let missing = |e: virtlane_hypervisor::HypervisorError| {
        tracing::debug!(
            machine_id = %domain.id(),
            snapshot = %name,
            error = %e,
            "Snapshot lookup failed"
        );
        CoreError::SnapshotMissing {
            name: name.to_string(),
        }
    };
    let snapshot = domain.snapshot_lookup_by_name(name).await.map_err(missing)?;
    snapshot.xml_desc().await.map_err(missing)?;
    Ok(snapshot)
}

/// Snapshot descriptor accepted by the hypervisor's snapshot-create call.
pub fn snapshot_xml(name: &str) -> String {
    format!(
        "<domainsnapshot>\n  <name>{}</name>\n  <description>{}</description>\n</domainsnapshot>\n",
        escape_xml(name),
        SNAPSHOT_DESCRIPTION
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
