//! Driver configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults,
//! or assembled with [`DriverConfigBuilder`].

use crate::address::AddressStrategy;
use crate::error::CoreError;
use std::fmt;
use std::time::Duration;

/// Default read/write endpoint.
pub const DEFAULT_URI: &str = "qemu:///system";

/// Default endpoint when running against a user session daemon.
pub const DEFAULT_SESSION_URI: &str = "qemu:///session";

/// Default host-side neighbour lookup; `$mac` is replaced with the domain MAC.
pub const DEFAULT_IP_COMMAND: &str = r#"awk "/$mac/ {print \$1}" /proc/net/arp"#;

/// Default time allowed for a machine to boot and obtain an address.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on address resolution while answering a state query.
pub const DEFAULT_STATE_ADDRESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between neighbour table polls.
pub const DEFAULT_ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a [`Driver`](crate::Driver).
#[derive(Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Primary (read/write) endpoint URI.
    pub uri: String,
    /// Endpoint for the read-only connection used for network introspection.
    pub system_uri: String,
    /// Optional user name for remote endpoints.
    pub username: Option<String>,
    /// Optional password for remote endpoints.
    pub password: Option<String>,
    /// Resolve addresses through the in-guest agent.
    pub qemu_use_agent: bool,
    /// Resolve addresses through virtual network DHCP leases.
    pub qemu_use_session: bool,
    /// Time allowed for a machine to boot and obtain an address.
    pub boot_timeout: Duration,
    /// Host command printing addresses for `$mac` (neighbour table strategy).
    pub ip_command: String,
    /// Interval between neighbour table polls.
    pub address_poll_interval: Duration,
    /// Cap on address resolution during state queries.
    pub state_address_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            system_uri: DEFAULT_URI.to_string(),
            username: None,
            password: None,
            qemu_use_agent: false,
            qemu_use_session: false,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            ip_command: DEFAULT_IP_COMMAND.to_string(),
            address_poll_interval: DEFAULT_ADDRESS_POLL_INTERVAL,
            state_address_timeout: DEFAULT_STATE_ADDRESS_TIMEOUT,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("uri", &self.uri)
            .field("system_uri", &self.system_uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("qemu_use_agent", &self.qemu_use_agent)
            .field("qemu_use_session", &self.qemu_use_session)
            .field("boot_timeout", &self.boot_timeout)
            .field("ip_command", &self.ip_command)
            .field("address_poll_interval", &self.address_poll_interval)
            .field("state_address_timeout", &self.state_address_timeout)
            .finish()
    }
}

impl DriverConfig {
    /// Create a new config builder.
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VIRTLANE_URI` | `qemu:///system` (`qemu:///session` with session networking) |
    /// | `VIRTLANE_SYSTEM_URI` | `qemu:///system` |
    /// | `VIRTLANE_USERNAME` | unset |
    /// | `VIRTLANE_PASSWORD` | unset |
    /// | `VIRTLANE_QEMU_USE_AGENT` | `false` |
    /// | `VIRTLANE_QEMU_USE_SESSION` | `false` |
    /// | `VIRTLANE_BOOT_TIMEOUT` | `300` (seconds) |
    /// | `VIRTLANE_IP_COMMAND` | `awk "/$mac/ {print \$1}" /proc/net/arp` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let qemu_use_session = flag("VIRTLANE_QEMU_USE_SESSION");
        let uri = non_empty("VIRTLANE_URI").unwrap_or_else(|| {
            if qemu_use_session {
                DEFAULT_SESSION_URI.to_string()
            } else {
                default.uri.clone()
            }
        });

        Self {
            uri,
            system_uri: non_empty("VIRTLANE_SYSTEM_URI").unwrap_or(default.system_uri),
            username: non_empty("VIRTLANE_USERNAME"),
            password: non_empty("VIRTLANE_PASSWORD"),
            qemu_use_agent: flag("VIRTLANE_QEMU_USE_AGENT"),
            qemu_use_session,
            boot_timeout: lookup("VIRTLANE_BOOT_TIMEOUT")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.boot_timeout),
            ip_command: non_empty("VIRTLANE_IP_COMMAND").unwrap_or(default.ip_command),
            ..default
        }
    }

    /// The address resolution strategy selected by this configuration.
    pub fn address_strategy(&self) -> AddressStrategy {
        AddressStrategy::from_flags(self.qemu_use_agent, self.qemu_use_session)
    }

    /// Timeout used for address resolution while answering a state query.
    pub fn state_timeout(&self) -> Duration {
        self.boot_timeout.min(self.state_address_timeout)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.uri.trim().is_empty() {
            return Err(CoreError::Config("uri is required".into()));
        }
        if self.system_uri.trim().is_empty() {
            return Err(CoreError::Config("system_uri is required".into()));
        }
        if self.boot_timeout.is_zero() {
            return Err(CoreError::Config("boot_timeout must be > 0".into()));
        }
        if self.address_poll_interval.is_zero() {
            return Err(CoreError::Config("address_poll_interval must be > 0".into()));
        }
        if self.ip_command.trim().is_empty() {
            return Err(CoreError::Config("ip_command is required".into()));
        }
        Ok(())
    }

    /// Log warnings for combinations that are allowed but probably unintended.
    pub fn validate_warn(&self) {
        if self.qemu_use_agent && self.qemu_use_session {
            tracing::warn!("Both guest agent and session networking enabled; guest agent wins");
        }
        if !self.ip_command.contains("$mac") {
            tracing::warn!(ip_command = %self.ip_command, "ip_command does not reference $mac");
        }
    }
}

/// Builder for DriverConfig.
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set the primary endpoint URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Set the read-only endpoint URI.
    pub fn system_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.system_uri = uri.into();
        self
    }

    /// Set credentials for remote endpoints.
    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = password;
        self
    }

    /// Resolve addresses through the guest agent.
    pub fn qemu_use_agent(mut self, enabled: bool) -> Self {
        self.config.qemu_use_agent = enabled;
        self
    }

    /// Resolve addresses through virtual network DHCP leases.
    pub fn qemu_use_session(mut self, enabled: bool) -> Self {
        self.config.qemu_use_session = enabled;
        self
    }

    /// Set the boot timeout.
    pub fn boot_timeout(mut self, timeout: Duration) -> Self {
        self.config.boot_timeout = timeout;
        self
    }

    /// Set the host neighbour lookup command.
    pub fn ip_command(mut self, command: impl Into<String>) -> Self {
        self.config.ip_command = command.into();
        self
    }

    /// Set the neighbour table poll interval.
    pub fn address_poll_interval(mut self, interval: Duration) -> Self {
        self.config.address_poll_interval = interval;
        self
    }

    /// Set the cap on address resolution during state queries.
    pub fn state_address_timeout(mut self, timeout: Duration) -> Self {
        self.config.state_address_timeout = timeout;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<DriverConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
