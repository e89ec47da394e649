//! Hypervisor client backed by the `virsh` command line tool.
//!
//! Each operation spawns `virsh -c <uri>` (with `-r` for read-only
//! connections) and maps its output onto the traits in [`crate::traits`].
//! Error text printed by virsh is classified so that missing domains and
//! missing snapshots surface as [`HypervisorError::NoDomain`] and
//! [`HypervisorError::NoSnapshot`].

use crate::error::{HypervisorError, Result};
use crate::traits::{Connection, Connector, Domain, DomainSnapshot, Network};
use crate::types::{ConnectParams, Lease};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default virsh binary, resolved through `PATH`.
const DEFAULT_VIRSH: &str = "virsh";

/// Slack added on top of a guest-agent timeout before the process is abandoned.
const AGENT_GRACE: Duration = Duration::from_secs(2);

/// Opens [`Connection`]s by running virsh.
#[derive(Debug, Clone)]
pub struct VirshConnector {
    binary: PathBuf,
}

impl Default for VirshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl VirshConnector {
    /// Connector using `virsh` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_VIRSH),
        }
    }

    /// Connector using a specific virsh binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Connector for VirshConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Connection>> {
        let uri = params.effective_uri();
        if params.password.is_some() {
            tracing::warn!(
                uri = %uri,
                "virsh backend cannot pass passwords; configure libvirt authentication instead"
            );
        }

        let virsh = Arc::new(Virsh {
            binary: self.binary.clone(),
            uri: uri.clone(),
            read_only: params.read_only,
        });

        // `virsh uri` opens the connection and prints the canonical URI.
        let canonical = virsh
            .run(&["uri"])
            .await
            .map_err(|e| HypervisorError::Connect {
                uri: uri.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!(
            uri = %uri,
            canonical = %canonical.trim(),
            read_only = params.read_only,
            "virsh connection verified"
        );

        Ok(Arc::new(VirshConnection { virsh }))
    }
}

/// Invocation context shared by every handle of one connection.
#[derive(Debug)]
struct Virsh {
    binary: PathBuf,
    uri: String,
    read_only: bool,
}

impl Virsh {
    async fn run(&self, args: &[&str]) -> Result<String> {
        self.run_with_input(args, None).await
    }

    async fn run_with_input(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-q").arg("-c").arg(&self.uri);
        if self.read_only {
            cmd.arg("-r");
        }
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command = args.first().copied().unwrap_or("virsh").to_string();
        tracing::trace!(uri = %self.uri, args = ?args, "Running virsh");

        let mut child = cmd.spawn()?;
        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(command = %command, stderr = %stderr.trim(), "virsh command failed");
        Err(classify_failure(&command, &stderr))
    }
}

/// Map virsh error text to an error variant.
fn classify_failure(command: &str, stderr: &str) -> HypervisorError {
    let message = stderr
        .lines()
        .map(|l| l.trim().trim_start_matches("error:").trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    if message.contains("Domain snapshot not found") {
        HypervisorError::NoSnapshot(message)
    } else if message.contains("Domain not found") || message.contains("failed to get domain") {
        HypervisorError::NoDomain(message)
    } else {
        HypervisorError::Command {
            command: command.to_string(),
            message,
        }
    }
}

/// Translate `virsh domstate` output to the hypervisor's state tokens.
fn state_token(display: &str) -> Option<String> {
    let display = display.trim();
    if display.is_empty() {
        return None;
    }
    let token = match display {
        "no state" => "nostate",
        "idle" => "blocked",
        "in shutdown" => "shutting-down",
        "shut off" => "shutoff",
        other => return Some(other.replace(' ', "-")),
    };
    Some(token.to_string())
}

/// MAC of the first interface in `virsh domiflist` output.
fn parse_first_mac(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|l| !l.trim_start().starts_with("Interface") && !l.trim_start().starts_with('-'))
        .filter_map(|l| l.split_whitespace().last())
        .find(|token| looks_like_mac(token))
        .map(|mac| mac.to_ascii_lowercase())
}

fn looks_like_mac(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse `virsh net-dhcp-leases` rows.
///
/// Columns: expiry date, expiry time, MAC, protocol, address/prefix,
/// hostname, client id. Header and separator rows are skipped.
fn parse_leases(output: &str) -> Vec<Lease> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            let stamp = format!("{} {}", cols[0], cols[1]);
            let expiry = parse_expiry(&stamp)?;
            if !looks_like_mac(cols[2]) {
                return None;
            }
            let ip = cols[4].split('/').next()?.parse().ok()?;
            let hostname = cols
                .get(5)
                .filter(|h| **h != "-")
                .map(|h| h.to_string());
            Some(Lease {
                mac: cols[2].to_ascii_lowercase(),
                ip,
                expiry,
                hostname,
            })
        })
        .collect()
}

fn parse_expiry(stamp: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

struct VirshConnection {
    virsh: Arc<Virsh>,
}

#[async_trait]
impl Connection for VirshConnection {
    fn uri(&self) -> &str {
        &self.virsh.uri
    }

    async fn lookup_domain(&self, id: &str) -> Result<Box<dyn Domain>> {
        self.virsh.run(&["domuuid", id]).await?;
        Ok(Box::new(VirshDomain {
            virsh: Arc::clone(&self.virsh),
            id: id.to_string(),
        }))
    }

    async fn list_networks(&self) -> Result<Vec<Box<dyn Network>>> {
        let output = self.virsh.run(&["net-list", "--all", "--name"]).await?;
        Ok(non_empty_lines(&output)
            .into_iter()
            .map(|name| {
                Box::new(VirshNetwork {
                    virsh: Arc::clone(&self.virsh),
                    name,
                }) as Box<dyn Network>
            })
            .collect())
    }
}

struct VirshDomain {
    virsh: Arc<Virsh>,
    id: String,
}

#[async_trait]
impl Domain for VirshDomain {
    fn id(&self) -> &str {
        &self.id
    }

    async fn state(&self) -> Result<Option<String>> {
        let output = self.virsh.run(&["domstate", self.id.as_str()]).await?;
        Ok(output.lines().next().and_then(state_token))
    }

    async fn mac(&self) -> Result<String> {
        let output = self.virsh.run(&["domiflist", self.id.as_str()]).await?;
        parse_first_mac(&output)
            .ok_or_else(|| HypervisorError::Parse(format!("no interface on domain {}", self.id)))
    }

    async fn snapshot_create(&self, xml: &str) -> Result<()> {
        self.virsh
            .run_with_input(
                &["snapshot-create", self.id.as_str(), "--xmlfile", "/dev/stdin"],
                Some(xml),
            )
            .await?;
        Ok(())
    }

    async fn snapshot_lookup_by_name(&self, name: &str) -> Result<Box<dyn DomainSnapshot>> {
        self.virsh
            .run(&["snapshot-info", "--domain", self.id.as_str(), "--snapshotname", name])
            .await?;
        Ok(Box::new(VirshSnapshot {
            virsh: Arc::clone(&self.virsh),
            domain: self.id.clone(),
            name: name.to_string(),
        }))
    }

    async fn snapshot_list_names(&self) -> Result<Vec<String>> {
        let output = self
            .virsh
            .run(&["snapshot-list", "--domain", self.id.as_str(), "--name"])
            .await?;
        Ok(non_empty_lines(&output))
    }

    async fn revert_to_snapshot(&self, snapshot: &dyn DomainSnapshot, force: bool) -> Result<()> {
        let mut args = vec![
            "snapshot-revert",
            "--domain",
            self.id.as_str(),
            "--snapshotname",
            snapshot.name(),
        ];
        if force {
            args.push("--force");
        }
        self.virsh.run(&args).await?;
        Ok(())
    }

    async fn qemu_agent_command(&self, payload: &str, timeout: Duration) -> Result<String> {
        let secs = agent_timeout_secs(timeout).to_string();
        let args = [
            "qemu-agent-command",
            "--domain",
            self.id.as_str(),
            "--timeout",
            secs.as_str(),
            payload,
        ];
        tokio::time::timeout(timeout.saturating_add(AGENT_GRACE), self.virsh.run(&args))
            .await
            .map_err(|_| HypervisorError::Timeout(timeout))?
    }
}

/// Whole seconds for `qemu-agent-command --timeout`, which virsh reads as an int.
fn agent_timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs().clamp(1, i32::MAX as u64)
}

struct VirshSnapshot {
    virsh: Arc<Virsh>,
    domain: String,
    name: String,
}

#[async_trait]
impl DomainSnapshot for VirshSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn xml_desc(&self) -> Result<String> {
        self.virsh
            .run(&[
                "snapshot-dumpxml",
                "--domain",
                self.domain.as_str(),
                "--snapshotname",
                self.name.as_str(),
            ])
            .await
    }

    async fn delete(&self) -> Result<()> {
        self.virsh
            .run(&[
                "snapshot-delete",
                "--domain",
                self.domain.as_str(),
                "--snapshotname",
                self.name.as_str(),
            ])
            .await?;
        Ok(())
    }
}

struct VirshNetwork {
    virsh: Arc<Virsh>,
    name: String,
}

#[async_trait]
impl Network for VirshNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dhcp_leases(&self, mac: Option<&str>) -> Result<Vec<Lease>> {
        let mut args = vec!["net-dhcp-leases", self.name.as_str()];
        if let Some(mac) = mac {
            args.push("--mac");
            args.push(mac);
        }
        let output = self.virsh.run(&args).await?;
        let leases = parse_leases(&output);
        tracing::trace!(network = %self.name, count = leases.len(), "DHCP leases parsed");
        Ok(leases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_token_mapping() {
        assert_eq!(state_token("running\n").as_deref(), Some("running"));
        assert_eq!(state_token("shut off").as_deref(), Some("shutoff"));
        assert_eq!(state_token("in shutdown").as_deref(), Some("shutting-down"));
        assert_eq!(state_token("idle").as_deref(), Some("blocked"));
        assert_eq!(state_token("pmsuspended").as_deref(), Some("pmsuspended"));
        assert_eq!(state_token("   "), None);
    }

    #[test]
    fn test_classify_missing_domain() {
        let err = classify_failure(
            "domuuid",
            "error: failed to get domain 'vm-1'\nerror: Domain not found: no domain with matching name 'vm-1'\n",
        );
        assert!(err.is_no_domain());
    }

    #[test]
    fn test_classify_missing_snapshot() {
        let err = classify_failure(
            "snapshot-info",
            "error: Domain snapshot not found: no domain snapshot with matching name 'base'",
        );
        assert!(err.is_no_snapshot());
    }

    #[test]
    fn test_classify_other_failure() {
        let err = classify_failure("domstate", "error: internal error: socket closed");
        match err {
            HypervisorError::Command { command, message } => {
                assert_eq!(command, "domstate");
                assert_eq!(message, "internal error: socket closed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_agent_timeout_secs() {
        assert_eq!(agent_timeout_secs(Duration::from_millis(200)), 1);
        assert_eq!(agent_timeout_secs(Duration::from_secs(30)), 30);
        assert_eq!(agent_timeout_secs(Duration::MAX), i32::MAX as u64);
    }

    #[test]
    fn test_parse_first_mac() {
        let output = "\
 Interface   Type      Source    Model    MAC
-------------------------------------------------------------
 vnet0       network   default   virtio   52:54:00:AB:cd:01
 vnet1       network   mgmt      virtio   52:54:00:ab:cd:02
";
        assert_eq!(parse_first_mac(output).as_deref(), Some("52:54:00:ab:cd:01"));
        assert_eq!(parse_first_mac(""), None);
    }

    #[test]
    fn test_parse_leases() {
        let output = "\
 Expiry Time           MAC address         Protocol   IP address           Hostname   Client ID or DUID
------------------------------------------------------------------------------------------------------------
 2024-05-01 10:00:00   52:54:00:aa:bb:cc   ipv4       192.168.122.45/24    box        -
 2024-05-01 11:30:00   52:54:00:aa:bb:cc   ipv4       192.168.122.46/24    -          01:52:54:00:aa:bb:cc
";
        let leases = parse_leases(output);
        assert_eq!(leases.len(), 2);
        assert_eq!(leases[0].ip.to_string(), "192.168.122.45");
        assert_eq!(leases[0].hostname.as_deref(), Some("box"));
        assert_eq!(leases[1].hostname, None);
        assert!(leases[1].expiry > leases[0].expiry);
    }

    #[tokio::test]
    #[ignore = "requires libvirtd"]
    async fn test_connect_local_system() {
        let connector = VirshConnector::new();
        let conn = connector
            .connect(&ConnectParams::new("qemu:///system").read_only())
            .await
            .expect("connect");
        assert!(conn.list_networks().await.is_ok());
    }
}
