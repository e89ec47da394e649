//! Guest-agent address lookup.
//!
//! The agent channel is best-effort: any failure on this path (agent not
//! installed, channel error, malformed reply, timeout) is logged and reads
//! as [`AddressQuery::NotFound`].

use super::AddressQuery;
use crate::connection::ConnectionManager;
use crate::error::{CoreError, Result};
use crate::machine::MachineId;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use virtlane_hypervisor::HypervisorError;

/// Agent command listing the guest's network interfaces.
pub const GUEST_NETWORK_GET_INTERFACES: &str = r#"{"execute":"guest-network-get-interfaces"}"#;

pub(super) async fn resolve(
    connections: &ConnectionManager,
    id: &MachineId,
    mac: &str,
    timeout: Duration,
) -> AddressQuery {
    let interfaces = match tokio::time::timeout(timeout, query_interfaces(connections, id, timeout))
        .await
    {
        Ok(Ok(interfaces)) => interfaces,
        Ok(Err(e)) => {
            tracing::warn!(machine_id = %id, error = %e, "Guest agent query failed");
            return AddressQuery::NotFound;
        }
        Err(_) => {
            tracing::warn!(
                machine_id = %id,
                timeout_ms = timeout.as_millis() as u64,
                "Guest agent query timed out"
            );
            return AddressQuery::NotFound;
        }
    };

    match select_ipv4(&interfaces, mac) {
        Some(ip) => AddressQuery::Found(ip),
        None => {
            tracing::debug!(machine_id = %id, mac = %mac, "Guest agent reported no IPv4 address");
            AddressQuery::NotFound
        }
    }
}

async fn query_interfaces(
    connections: &ConnectionManager,
    id: &MachineId,
    timeout: Duration,
) -> Result<Vec<GuestInterface>> {
    // Resolve a fresh handle; the caller's may predate an agent restart.
    let domain = connections
        .lookup_domain(id)
        .await?
        .ok_or_else(|| CoreError::DomainNotFound(id.clone()))?;

    let response = domain
        .qemu_agent_command(GUEST_NETWORK_GET_INTERFACES, timeout)
        .await?;
    tracing::trace!(machine_id = %id, response = %response, "Guest agent response");

    let parsed: AgentResponse = serde_json::from_str(&response).map_err(HypervisorError::from)?;
    Ok(parsed.interfaces)
}

/// First IPv4 address of the first interface whose hardware address matches.
///
/// IPv6 entries are skipped.
fn select_ipv4(interfaces: &[GuestInterface], mac: &str) -> Option<IpAddr> {
    let iface = interfaces.iter().find(|iface| {
        iface
            .hardware_address
            .as_deref()
            .is_some_and(|hw| hw.eq_ignore_ascii_case(mac))
    })?;
    tracing::trace!(interface = %iface.name, "Matched guest interface");

    iface
        .ip_addresses
        .iter()
        .filter(|addr| addr.kind.eq_ignore_ascii_case("ipv4"))
        .find_map(|addr| addr.address.parse().ok())
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    #[serde(rename = "return")]
    interfaces: Vec<GuestInterface>,
}

#[derive(Debug, Deserialize)]
struct GuestInterface {
    name: String,
    #[serde(rename = "hardware-address", default)]
    hardware_address: Option<String>,
    #[serde(rename = "ip-addresses", default)]
    ip_addresses: Vec<GuestIpAddress>,
}

#[derive(Debug, Deserialize)]
struct GuestIpAddress {
    #[serde(rename = "ip-address-type")]
    kind: String,
    #[serde(rename = "ip-address")]
    address: String,
}
