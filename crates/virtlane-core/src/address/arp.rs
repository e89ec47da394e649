//! Host neighbour table polling.

use super::AddressQuery;
use crate::neighbor::NeighborLookup;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AddressKind {
    V4,
    V6,
}

pub(super) async fn resolve(
    neighbors: &dyn NeighborLookup,
    mac: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> AddressQuery {
    let start = Instant::now();
    let deadline = deadline_after(start, timeout);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let output = match tokio::time::timeout_at(deadline, neighbors.lookup(mac)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(mac = %mac, error = %e, attempts, "Neighbour lookup failed");
                return AddressQuery::NotFound;
            }
            Err(_) => break,
        };

        if let Some(ip) = pick_address(&output) {
            tracing::debug!(
                mac = %mac,
                ip = %ip,
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Neighbour table entry found"
            );
            return AddressQuery::Found(ip);
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tracing::trace!(mac = %mac, attempt = attempts, "No neighbour entry yet, retrying...");
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }

    tracing::debug!(
        mac = %mac,
        attempts,
        timeout_ms = timeout.as_millis() as u64,
        "Neighbour lookup timed out"
    );
    AddressQuery::Timeout
}

/// `start + timeout`, clamped to a far-future instant instead of overflowing.
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// First address per address family, IPv4 preferred.
///
/// Each line contributes its first token; lines that are not addresses are
/// ignored. Earlier lines are more recent entries.
fn pick_address(output: &str) -> Option<IpAddr> {
    let mut candidates: HashMap<AddressKind, IpAddr> = HashMap::new();
    for token in output.lines().filter_map(|l| l.split_whitespace().next()) {
        let Ok(ip) = token.parse::<IpAddr>() else {
            continue;
        };
        let kind = if ip.is_ipv4() {
            AddressKind::V4
        } else {
            AddressKind::V6
        };
        candidates.entry(kind).or_insert(ip);
    }
    candidates
        .get(&AddressKind::V4)
        .or_else(|| candidates.get(&AddressKind::V6))
        .copied()
}
