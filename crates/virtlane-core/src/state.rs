//! Machine state reconciliation.
//!
//! Maps the hypervisor's raw domain state onto [`MachineState`], refining
//! `running` into `inaccessible` when address resolution times out.

use crate::address::{AddressQuery, AddressResolver};
use crate::connection::ConnectionManager;
use crate::error::{CoreError, Result};
use crate::machine::{normalize_state, MachineId, MachineState};
use std::sync::Arc;
use std::time::Duration;

/// Derives machine state from the hypervisor on every call.
pub struct StateReconciler {
    connections: Arc<ConnectionManager>,
    resolver: Arc<AddressResolver>,
    address_timeout: Duration,
}

impl StateReconciler {
    /// Create a reconciler that allows `address_timeout` for address
    /// resolution on running domains.
    pub fn new(
        connections: Arc<ConnectionManager>,
        resolver: Arc<AddressResolver>,
        address_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            resolver,
            address_timeout,
        }
    }

    /// Current state of the machine.
    ///
    /// # Errors
    ///
    /// "No such domain" is reported as [`MachineState::NotCreated`], including
    /// when the domain disappears mid-query; any other lookup failure, and any
    /// other address resolution error, is returned.
    pub async fn state(&self, id: &MachineId) -> Result<MachineState> {
        if id.is_empty() {
            return Ok(MachineState::NotCreated);
        }

        let Some(domain) = self.connections.lookup_domain(id).await? else {
            return Ok(MachineState::NotCreated);
        };

        let raw = match domain.state().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(machine_id = %id, "Domain reports no state");
                return Ok(MachineState::Unknown);
            }
            Err(e) if e.is_no_domain() => return Ok(MachineState::NotCreated),
            Err(e) => {
                tracing::warn!(machine_id = %id, error = %e, "Domain state unreadable");
                return Ok(MachineState::Unknown);
            }
        };

        let tag = normalize_state(&raw);
        tracing::trace!(machine_id = %id, raw = %raw, tag = %tag, "Domain state");

        // A just-defined or just-undefined domain can report `terminated`
        // before lookups start failing.
        if tag == "terminated" {
            return Ok(MachineState::NotCreated);
        }

        if tag == "running" {
            let query = match self
                .resolver
                .resolve(domain.as_ref(), id, self.address_timeout)
                .await
            {
                Ok(query) => query,
                // Undefined between the state read and the address lookup.
                Err(CoreError::Hypervisor(e)) if e.is_no_domain() => {
                    tracing::debug!(machine_id = %id, "Domain disappeared while running");
                    return Ok(MachineState::NotCreated);
                }
                Err(e) => return Err(e),
            };
            if query == AddressQuery::Timeout {
                tracing::info!(
                    machine_id = %id,
                    timeout_ms = self.address_timeout.as_millis() as u64,
                    "Running domain has no address yet"
                );
                return Ok(MachineState::Inaccessible);
            }
            return Ok(MachineState::Running);
        }

        Ok(MachineState::from_tag(&tag))
    }
}
