//! In-memory hypervisor used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use virtlane_core::{Driver, DriverConfig, NeighborLookup};
use virtlane_hypervisor::{
    ConnectParams, Connection, Connector, Domain, DomainSnapshot, HypervisorError, Lease, Network,
    Result,
};

pub const MAC: &str = "52:54:00:aa:bb:cc";

#[derive(Debug, Clone)]
pub struct FakeDomain {
    pub state: Option<String>,
    pub mac: String,
    pub snapshots: Vec<String>,
    pub agent_response: std::result::Result<String, String>,
    pub fail_snapshot_delete: bool,
    /// Undefine the domain right after its state has been read.
    pub vanish_after_state: bool,
    /// Report "no domain" when the MAC is read.
    pub mac_missing: bool,
}

impl FakeDomain {
    pub fn with_state(state: &str) -> Self {
        Self {
            state: Some(state.to_string()),
            mac: MAC.to_string(),
            snapshots: Vec::new(),
            agent_response: Err("guest agent is not connected".into()),
            fail_snapshot_delete: false,
            vanish_after_state: false,
            mac_missing: false,
        }
    }

    pub fn running() -> Self {
        Self::with_state("running")
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub domains: HashMap<String, FakeDomain>,
    pub networks: Vec<(String, Vec<Lease>)>,
    pub lookup_failure: Option<String>,
    pub connect_failure: bool,
    pub agent_payloads: Vec<String>,
    pub reverts: Vec<(String, bool)>,
    /// `(domain, snapshot)` removed once its descriptor has been read.
    pub vanishing_snapshot: Option<(String, String)>,
}

/// Shared fake hypervisor; every connection observes the same state.
#[derive(Clone, Default)]
pub struct FakeHypervisor {
    state: Arc<Mutex<FakeState>>,
    connects: Arc<AtomicUsize>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_domain(&self, id: &str, domain: FakeDomain) {
        self.state().domains.insert(id.to_string(), domain);
    }

    pub fn add_network(&self, name: &str, leases: Vec<Lease>) {
        self.state().networks.push((name.to_string(), leases));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

pub fn lease(ip: &str, expiry: i64) -> Lease {
    Lease {
        mac: MAC.to_string(),
        ip: ip.parse().unwrap(),
        expiry: Utc.timestamp_opt(expiry, 0).unwrap(),
        hostname: None,
    }
}

#[async_trait]
impl Connector for FakeHypervisor {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Connection>> {
        if self.state().connect_failure {
            return Err(HypervisorError::Connect {
                uri: params.uri.clone(),
                message: "connection refused".into(),
            });
        }
        // Give racing callers a chance to overlap.
        tokio::task::yield_now().await;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            state: Arc::clone(&self.state),
            uri: params.uri.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    uri: String,
}

#[async_trait]
impl Connection for FakeConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn lookup_domain(&self, id: &str) -> Result<Box<dyn Domain>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.lookup_failure {
            return Err(HypervisorError::Command {
                command: "lookup".into(),
                message: message.clone(),
            });
        }
        if !state.domains.contains_key(id) {
            return Err(HypervisorError::NoDomain(id.to_string()));
        }
        Ok(Box::new(FakeDomainHandle {
            state: Arc::clone(&self.state),
            id: id.to_string(),
        }))
    }

    async fn list_networks(&self) -> Result<Vec<Box<dyn Network>>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .map(|(name, leases)| {
                Box::new(FakeNetwork {
                    name: name.clone(),
                    leases: leases.clone(),
                }) as Box<dyn Network>
            })
            .collect())
    }
}

struct FakeDomainHandle {
    state: Arc<Mutex<FakeState>>,
    id: String,
}

impl FakeDomainHandle {
    fn with_domain<T>(&self, f: impl FnOnce(&mut FakeDomain) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let domain = state
            .domains
            .get_mut(&self.id)
            .ok_or_else(|| HypervisorError::NoDomain(self.id.clone()))?;
        f(domain)
    }
}

#[async_trait]
impl Domain for FakeDomainHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn state(&self) -> Result<Option<String>> {
        let (state, vanish) =
            self.with_domain(|d| Ok((d.state.clone(), d.vanish_after_state)))?;
        if vanish {
            self.state.lock().unwrap().domains.remove(&self.id);
        }
        Ok(state)
    }

    async fn mac(&self) -> Result<String> {
        self.with_domain(|d| {
            if d.mac_missing {
                return Err(HypervisorError::NoDomain(self.id.clone()));
            }
            Ok(d.mac.clone())
        })
    }

    async fn snapshot_create(&self, xml: &str) -> Result<()> {
        let name = xml
            .split("<name>")
            .nth(1)
            .and_then(|rest| rest.split("</name>").next())
            .ok_or_else(|| HypervisorError::Parse("snapshot xml without name".into()))?
            .to_string();
        self.with_domain(|d| {
            if d.snapshots.contains(&name) {
                return Err(HypervisorError::Command {
                    command: "snapshot-create".into(),
                    message: format!("snapshot {name} already exists"),
                });
            }
            d.snapshots.push(name);
            Ok(())
        })
    }

    async fn snapshot_lookup_by_name(&self, name: &str) -> Result<Box<dyn DomainSnapshot>> {
        self.with_domain(|d| {
            if d.snapshots.iter().any(|s| s == name) {
                Ok(())
            } else {
                Err(HypervisorError::NoSnapshot(name.to_string()))
            }
        })?;
        Ok(Box::new(FakeSnapshot {
            state: Arc::clone(&self.state),
            domain: self.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn snapshot_list_names(&self) -> Result<Vec<String>> {
        self.with_domain(|d| Ok(d.snapshots.clone()))
    }

    async fn revert_to_snapshot(&self, snapshot: &dyn DomainSnapshot, force: bool) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .reverts
            .push((snapshot.name().to_string(), force));
        Ok(())
    }

    async fn qemu_agent_command(&self, payload: &str, _timeout: Duration) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .agent_payloads
            .push(payload.to_string());
        self.with_domain(|d| {
            d.agent_response
                .clone()
                .map_err(|message| HypervisorError::Command {
                    command: "qemu-agent-command".into(),
                    message,
                })
        })
    }
}

struct FakeSnapshot {
    state: Arc<Mutex<FakeState>>,
    domain: String,
    name: String,
}

#[async_trait]
impl DomainSnapshot for FakeSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn xml_desc(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let target = (self.domain.clone(), self.name.clone());
        if state.vanishing_snapshot.as_ref() == Some(&target) {
            state.vanishing_snapshot = None;
            if let Some(domain) = state.domains.get_mut(&self.domain) {
                domain.snapshots.retain(|s| s != &self.name);
            }
        }
        Ok(format!("<domainsnapshot><name>{}</name></domainsnapshot>", self.name))
    }

    async fn delete(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let domain = state
            .domains
            .get_mut(&self.domain)
            .ok_or_else(|| HypervisorError::NoDomain(self.domain.clone()))?;
        if domain.fail_snapshot_delete {
            return Err(HypervisorError::Command {
                command: "snapshot-delete".into(),
                message: "snapshot is in use".into(),
            });
        }
        let before = domain.snapshots.len();
        domain.snapshots.retain(|s| s != &self.name);
        if domain.snapshots.len() == before {
            return Err(HypervisorError::NoSnapshot(self.name.clone()));
        }
        Ok(())
    }
}

struct FakeNetwork {
    name: String,
    leases: Vec<Lease>,
}

#[async_trait]
impl Network for FakeNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dhcp_leases(&self, mac: Option<&str>) -> Result<Vec<Lease>> {
        Ok(self
            .leases
            .iter()
            .filter(|l| mac.map_or(true, |m| l.mac.eq_ignore_ascii_case(m)))
            .cloned()
            .collect())
    }
}

/// Host neighbour table keyed by MAC.
#[derive(Default)]
pub struct FakeNeighbors {
    pub table: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeNeighbors {
    pub fn with_entry(mac: &str, output: &str) -> Self {
        let neighbors = Self::default();
        neighbors
            .table
            .lock()
            .unwrap()
            .insert(mac.to_string(), output.to_string());
        neighbors
    }
}

#[async_trait]
impl NeighborLookup for FakeNeighbors {
    async fn lookup(&self, mac: &str) -> virtlane_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .lock()
            .unwrap()
            .get(mac)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn driver(
    config: DriverConfig,
    hypervisor: &FakeHypervisor,
    neighbors: Arc<FakeNeighbors>,
) -> Driver {
    Driver::with_backends(config, Arc::new(hypervisor.clone()), neighbors)
        .expect("valid configuration")
}

pub fn arp_config() -> DriverConfig {
    DriverConfig::builder().build().expect("valid configuration")
}

pub fn agent_config() -> DriverConfig {
    DriverConfig::builder()
        .qemu_use_agent(true)
        .build()
        .expect("valid configuration")
}

pub fn session_config() -> DriverConfig {
    DriverConfig::builder()
        .qemu_use_session(true)
        .uri("qemu:///session")
        .build()
        .expect("valid configuration")
}
