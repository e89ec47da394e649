//! Machine identity and derived machine state.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Identifier of a machine, as recorded by the orchestration tool.
///
/// Usually the domain UUID, but any name the hypervisor resolves works.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no id has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MachineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// State of a machine, derived fresh from the hypervisor on every query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// No domain exists for the machine.
    NotCreated,
    /// The hypervisor could not report a state.
    Unknown,
    /// The domain is running.
    Running,
    /// The domain reports running but no address resolved in time.
    Inaccessible,
    /// Any other hypervisor state, as a normalised tag (`shutoff`, `paused`, ...).
    Other(String),
}

impl MachineState {
    /// Build a state from an already normalised tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "not_created" => Self::NotCreated,
            "unknown" => Self::Unknown,
            "running" => Self::Running,
            "inaccessible" => Self::Inaccessible,
            other => Self::Other(other.to_string()),
        }
    }

    /// Snake-case tag for this state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotCreated => "not_created",
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Inaccessible => "inaccessible",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(&normalize_state(s)))
    }
}

/// Normalise a raw hypervisor state string to a tag: trimmed, lower-case,
/// hyphens and spaces turned into underscores.
pub fn normalize_state(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}
