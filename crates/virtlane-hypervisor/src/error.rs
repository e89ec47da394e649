//! Error types for virtlane-hypervisor.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for hypervisor client operations.
pub type Result<T> = std::result::Result<T, HypervisorError>;

/// Errors reported by a hypervisor client.
#[derive(Debug, Error)]
pub enum HypervisorError {
    /// The requested domain does not exist
    #[error("domain not found: {0}")]
    NoDomain(String),

    /// The requested snapshot does not exist on the domain
    #[error("snapshot not found: {0}")]
    NoSnapshot(String),

    /// Connection to the hypervisor could not be established
    #[error("failed to connect to {uri}: {message}")]
    Connect { uri: String, message: String },

    /// A hypervisor command was rejected
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    /// Output from the hypervisor could not be understood
    #[error("unexpected hypervisor output: {0}")]
    Parse(String),

    /// Operation exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HypervisorError {
    /// True for the recoverable "no such domain" condition.
    pub fn is_no_domain(&self) -> bool {
        matches!(self, Self::NoDomain(_))
    }

    /// True when a snapshot lookup found nothing under the requested name.
    pub fn is_no_snapshot(&self) -> bool {
        matches!(self, Self::NoSnapshot(_))
    }
}
