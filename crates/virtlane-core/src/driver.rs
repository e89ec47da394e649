//! The driver: one owning context per configured hypervisor endpoint.

use crate::address::{AddressQuery, AddressResolver, AddressStrategy};
use crate::config::DriverConfig;
use crate::connection::ConnectionManager;
use crate::error::{CoreError, Result};
use crate::machine::{MachineId, MachineState};
use crate::neighbor::{CommandNeighborLookup, NeighborLookup};
use crate::snapshot::SnapshotManager;
use crate::state::StateReconciler;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use virtlane_hypervisor::{Connector, VirshConnector};

/// Entry point for machine state, address and snapshot operations.
///
/// A driver owns its hypervisor connections for its whole lifetime; share it
/// (for example behind an `Arc`) rather than creating one per operation.
pub struct Driver {
    config: DriverConfig,
    connections: Arc<ConnectionManager>,
    resolver: Arc<AddressResolver>,
    states: StateReconciler,
    snapshots: SnapshotManager,
}

impl Driver {
    /// Create a driver backed by `virsh` and the configured `ip_command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DriverConfig) -> Result<Self> {
        let neighbors = Arc::new(CommandNeighborLookup::new(&config.ip_command));
        Self::with_backends(config, Arc::new(VirshConnector::new()), neighbors)
    }

    /// Create a driver with explicit hypervisor and neighbour lookup backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_backends(
        config: DriverConfig,
        connector: Arc<dyn Connector>,
        neighbors: Arc<dyn NeighborLookup>,
    ) -> Result<Self> {
        config.validate()?;
        config.validate_warn();

        let strategy = config.address_strategy();
        tracing::info!(
            uri = %config.uri,
            system_uri = %config.system_uri,
            strategy = %strategy,
            "Creating driver"
        );

        let connections = Arc::new(ConnectionManager::new(connector, &config));
        let resolver = Arc::new(AddressResolver::new(
            strategy,
            Arc::clone(&connections),
            neighbors,
            config.address_poll_interval,
        ));
        let states = StateReconciler::new(
            Arc::clone(&connections),
            Arc::clone(&resolver),
            config.state_timeout(),
        );
        let snapshots = SnapshotManager::new(Arc::clone(&connections));

        Ok(Self {
            config,
            connections,
            resolver,
            states,
            snapshots,
        })
    }

    /// The configuration this driver was created with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The active address resolution strategy.
    pub fn address_strategy(&self) -> AddressStrategy {
        self.resolver.strategy()
    }

    /// The driver's connection cache.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Snapshot operations.
    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Current state of a machine.
    pub async fn state(&self, id: &MachineId) -> Result<MachineState> {
        let state = self.states.state(id).await?;
        tracing::debug!(machine_id = %id, state = %state, "Machine state");
        Ok(state)
    }

    /// Address of a machine, waiting up to the boot timeout.
    ///
    /// Returns `Ok(None)` when the address source answered without an
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DomainNotFound`] for a machine without a domain
    /// and [`CoreError::AddressTimeout`] when no address appeared in time.
    pub async fn address(&self, id: &MachineId) -> Result<Option<IpAddr>> {
        self.wait_for_address(id, self.config.boot_timeout).await
    }

    /// Address of a machine, waiting at most `timeout`.
    ///
    /// Only the neighbour table strategy polls; the other strategies answer
    /// once.
    pub async fn wait_for_address(
        &self,
        id: &MachineId,
        timeout: Duration,
    ) -> Result<Option<IpAddr>> {
        let domain = self
            .connections
            .lookup_domain(id)
            .await?
            .ok_or_else(|| CoreError::DomainNotFound(id.clone()))?;

        let start = std::time::Instant::now();
        let query = match self.resolver.resolve(domain.as_ref(), id, timeout).await {
            Ok(query) => query,
            Err(CoreError::Hypervisor(e)) if e.is_no_domain() => {
                return Err(CoreError::DomainNotFound(id.clone()));
            }
            Err(e) => return Err(e),
        };
        match query {
            AddressQuery::Found(ip) => {
                tracing::info!(
                    machine_id = %id,
                    ip = %ip,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Machine address resolved"
                );
                Ok(Some(ip))
            }
            AddressQuery::NotFound => {
                tracing::info!(machine_id = %id, "No address available for machine");
                Ok(None)
            }
            AddressQuery::Timeout => Err(CoreError::AddressTimeout(timeout)),
        }
    }
}
