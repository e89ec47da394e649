//! Address resolution engine.
//!
//! Produces the IP address of a running domain from exactly one source,
//! chosen once from configuration:
//!
//! | Strategy | Source | Bounded by timeout |
//! |----------|--------|--------------------|
//! | [`AddressStrategy::GuestAgent`] | in-guest agent, `guest-network-get-interfaces` | yes, failures read as "no address" |
//! | [`AddressStrategy::NetworkLease`] | DHCP leases of the virtual networks | no |
//! | [`AddressStrategy::ArpTable`] | host neighbour table, polled | yes, may yield [`AddressQuery::Timeout`] |
//!
//! Only the neighbour table strategy can report a timeout.

mod agent;
mod arp;
mod lease;

pub use agent::GUEST_NETWORK_GET_INTERFACES;
pub use lease::latest_lease;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::machine::MachineId;
use crate::neighbor::NeighborLookup;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use virtlane_hypervisor::Domain;

/// Terminal outcome of an address query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressQuery {
    /// An address was found.
    Found(IpAddr),
    /// The source answered but knows no address for the domain.
    NotFound,
    /// No address appeared before the deadline.
    Timeout,
}

impl AddressQuery {
    /// The address, if one was found.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Found(ip) => Some(*ip),
            Self::NotFound | Self::Timeout => None,
        }
    }
}

/// Where addresses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStrategy {
    /// Ask the in-guest agent for its interfaces.
    GuestAgent,
    /// Read DHCP leases from the virtual networks.
    NetworkLease,
    /// Poll the host neighbour table.
    ArpTable,
}

impl AddressStrategy {
    /// Select a strategy from configuration flags: agent, then session, then
    /// the neighbour table.
    pub fn from_flags(qemu_use_agent: bool, qemu_use_session: bool) -> Self {
        if qemu_use_agent {
            Self::GuestAgent
        } else if qemu_use_session {
            Self::NetworkLease
        } else {
            Self::ArpTable
        }
    }
}

impl fmt::Display for AddressStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GuestAgent => write!(f, "guest-agent"),
            Self::NetworkLease => write!(f, "network-lease"),
            Self::ArpTable => write!(f, "arp-table"),
        }
    }
}

/// Resolves domain addresses with the configured strategy.
pub struct AddressResolver {
    strategy: AddressStrategy,
    connections: Arc<ConnectionManager>,
    neighbors: Arc<dyn NeighborLookup>,
    poll_interval: Duration,
}

impl AddressResolver {
    /// Create a resolver.
    pub fn new(
        strategy: AddressStrategy,
        connections: Arc<ConnectionManager>,
        neighbors: Arc<dyn NeighborLookup>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            strategy,
            connections,
            neighbors,
            poll_interval,
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> AddressStrategy {
        self.strategy
    }

    /// Resolve the address of `domain`.
    ///
    /// # Errors
    ///
    /// Fails if the domain MAC cannot be read or, for the network lease
    /// strategy, if networks or leases cannot be enumerated. Guest-agent and
    /// neighbour lookup failures are not errors.
    pub async fn resolve(
        &self,
        domain: &dyn Domain,
        id: &MachineId,
        timeout: Duration,
    ) -> Result<AddressQuery> {
        let mac = domain.mac().await?;
        tracing::debug!(
            machine_id = %id,
            mac = %mac,
            strategy = %self.strategy,
            timeout_ms = timeout.as_millis() as u64,
            "Resolving address"
        );

        let result = match self.strategy {
            AddressStrategy::GuestAgent => {
                agent::resolve(&self.connections, id, &mac, timeout).await
            }
            AddressStrategy::NetworkLease => lease::resolve(&self.connections, &mac).await?,
            AddressStrategy::ArpTable => {
                arp::resolve(self.neighbors.as_ref(), &mac, timeout, self.poll_interval).await
            }
        };

        tracing::debug!(machine_id = %id, result = ?result, "Address resolution finished");
        Ok(result)
    }
}
