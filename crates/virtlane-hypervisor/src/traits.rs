//! Traits describing the hypervisor client.
//!
//! Every backend (the `virsh` CLI backend in this crate, or an in-memory fake
//! in tests) implements these. Handles returned by a [`Connection`] are live
//! views into hypervisor-managed state: every call may observe changes made
//! behind the caller's back.

use crate::error::Result;
use crate::types::{ConnectParams, Lease};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Opens connections to a hypervisor endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached or rejects the
    /// credentials.
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Connection>>;
}

/// An established hypervisor connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The URI this connection was opened against.
    fn uri(&self) -> &str;

    /// Look up a domain by its machine id.
    ///
    /// # Errors
    ///
    /// Returns [`HypervisorError::NoDomain`](crate::HypervisorError::NoDomain)
    /// when no such domain exists, any other variant for unexpected faults.
    async fn lookup_domain(&self, id: &str) -> Result<Box<dyn Domain>>;

    /// Enumerate virtual networks.
    async fn list_networks(&self) -> Result<Vec<Box<dyn Network>>>;
}

/// A hypervisor-managed virtual machine.
#[async_trait]
pub trait Domain: Send + Sync {
    /// Machine id the domain was resolved with.
    fn id(&self) -> &str;

    /// Raw state string (e.g. `running`, `shutoff`, `shutting-down`),
    /// `None` when the hypervisor cannot report one.
    async fn state(&self) -> Result<Option<String>>;

    /// MAC address of the primary network interface.
    async fn mac(&self) -> Result<String>;

    /// Create a snapshot from a snapshot descriptor.
    async fn snapshot_create(&self, xml: &str) -> Result<()>;

    /// Look up a snapshot by name.
    ///
    /// # Errors
    ///
    /// Returns [`HypervisorError::NoSnapshot`](crate::HypervisorError::NoSnapshot)
    /// when the domain has no snapshot with that name.
    async fn snapshot_lookup_by_name(&self, name: &str) -> Result<Box<dyn DomainSnapshot>>;

    /// Names of all snapshots, in hypervisor order.
    async fn snapshot_list_names(&self) -> Result<Vec<String>>;

    /// Revert the domain to a snapshot.
    async fn revert_to_snapshot(&self, snapshot: &dyn DomainSnapshot, force: bool) -> Result<()>;

    /// Send a raw JSON command over the guest-agent channel.
    async fn qemu_agent_command(&self, payload: &str, timeout: Duration) -> Result<String>;
}

/// A named snapshot of a domain.
#[async_trait]
pub trait DomainSnapshot: Send + Sync {
    /// Snapshot name.
    fn name(&self) -> &str;

    /// The snapshot descriptor.
    async fn xml_desc(&self) -> Result<String>;

    /// Delete the snapshot.
    async fn delete(&self) -> Result<()>;
}

/// A virtual network with its own DHCP lease store.
#[async_trait]
pub trait Network: Send + Sync {
    /// Network name.
    fn name(&self) -> &str;

    /// DHCP leases, optionally filtered by MAC address.
    async fn dhcp_leases(&self, mac: Option<&str>) -> Result<Vec<Lease>>;
}
