//! Plain data exchanged with the hypervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Parameters used to open a hypervisor connection.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    /// Endpoint URI, e.g. `qemu:///system` or `qemu+ssh://host/system`.
    pub uri: String,
    /// Optional user name for remote endpoints.
    pub username: Option<String>,
    /// Optional password for remote endpoints.
    pub password: Option<String>,
    /// Open the connection read-only.
    pub read_only: bool,
}

impl ConnectParams {
    /// Parameters for a read/write connection to `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Mark the connection read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// URI with the user name folded into the authority part.
    ///
    /// Local URIs (`qemu:///system`) have no authority and are returned
    /// unchanged, as are URIs that already name a user.
    pub fn effective_uri(&self) -> String {
        let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) else {
            return self.uri.clone();
        };
        let Some((scheme, rest)) = self.uri.split_once("://") else {
            return self.uri.clone();
        };
        if rest.starts_with('/') {
            return self.uri.clone();
        }
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.contains('@') {
            return self.uri.clone();
        }
        format!("{scheme}://{user}@{rest}")
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// A DHCP or neighbour-table record binding a MAC address to an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Hardware address, lower-case colon separated.
    pub mac: String,
    /// Leased address.
    pub ip: IpAddr,
    /// When the lease expires.
    pub expiry: DateTime<Utc>,
    /// Client host name, when the lease table records one.
    pub hostname: Option<String>,
}
