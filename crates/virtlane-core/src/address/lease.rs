//! Virtual network DHCP lease lookup.

use super::AddressQuery;
use crate::connection::ConnectionManager;
use crate::error::Result;
use virtlane_hypervisor::Lease;

pub(super) async fn resolve(connections: &ConnectionManager, mac: &str) -> Result<AddressQuery> {
    let conn = connections.read_only_connection().await?;

    for network in conn.list_networks().await? {
        let leases = network.dhcp_leases(Some(mac)).await?;
        let leases: Vec<Lease> = leases
            .into_iter()
            .filter(|l| l.mac.eq_ignore_ascii_case(mac))
            .collect();

        if let Some(lease) = latest_lease(&leases) {
            tracing::debug!(
                network = %network.name(),
                ip = %lease.ip,
                expiry = %lease.expiry,
                candidates = leases.len(),
                "Found DHCP lease"
            );
            return Ok(AddressQuery::Found(lease.ip));
        }
        tracing::trace!(network = %network.name(), mac = %mac, "No lease on network");
    }

    Ok(AddressQuery::NotFound)
}

/// The authoritative lease: the one expiring last.
pub fn latest_lease(leases: &[Lease]) -> Option<&Lease> {
    leases.iter().max_by_key(|l| l.expiry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn lease(ip: &str, expiry: i64) -> Lease {
        Lease {
            mac: "52:54:00:aa:bb:cc".into(),
            ip: ip.parse().unwrap(),
            expiry: Utc.timestamp_opt(expiry, 0).unwrap(),
            hostname: None,
        }
    }

    #[test]
    fn test_latest_expiry_wins() {
        let leases = vec![lease("10.0.0.1", 100), lease("10.0.0.2", 200)];
        assert_eq!(latest_lease(&leases).map(|l| l.ip.to_string()).as_deref(), Some("10.0.0.2"));

        let reversed = vec![lease("10.0.0.2", 200), lease("10.0.0.1", 100)];
        assert_eq!(latest_lease(&reversed).map(|l| l.ip.to_string()).as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_no_leases() {
        assert!(latest_lease(&[]).is_none());
    }
}
