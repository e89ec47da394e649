//! Error types for virtlane-core.

use crate::machine::MachineId;
use std::time::Duration;
use thiserror::Error;
use virtlane_hypervisor::HypervisorError;

/// Result type alias for virtlane-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while managing machines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Establishing a hypervisor connection failed
    #[error("connection to {uri} failed: {source}")]
    Connection {
        /// URI the connection was opened against
        uri: String,
        /// Underlying failure
        #[source]
        source: HypervisorError,
    },

    /// Unexpected hypervisor fault, passed through unchanged
    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    /// No address became available in time
    #[error("timed out after {0:?} waiting for an IP address")]
    AddressTimeout(Duration),

    /// Machine has no domain on the hypervisor
    #[error("domain not found for machine {0}")]
    DomainNotFound(MachineId),

    /// Snapshot lookup found nothing under that name
    #[error("snapshot {name} not found")]
    SnapshotMissing {
        /// Snapshot name
        name: String,
    },

    /// Creating a snapshot failed
    #[error("failed to create snapshot {name}: {source}")]
    SnapshotCreation {
        /// Snapshot name
        name: String,
        /// Underlying failure
        #[source]
        source: Box<CoreError>,
    },

    /// Deleting a snapshot failed
    #[error("failed to delete snapshot {name}: {source}")]
    SnapshotDeletion {
        /// Snapshot name
        name: String,
        /// Underlying failure
        #[source]
        source: Box<CoreError>,
    },

    /// Listing snapshots failed
    #[error("failed to list snapshots: {source}")]
    SnapshotList {
        /// Underlying failure
        #[source]
        source: Box<CoreError>,
    },

    /// Reverting to a snapshot failed
    #[error("failed to revert to snapshot {name}: {source}")]
    SnapshotReversion {
        /// Snapshot name
        name: String,
        /// Underlying failure
        #[source]
        source: Box<CoreError>,
    },

    /// Host neighbour table lookup failed
    #[error("neighbour lookup failed: {0}")]
    NeighborLookup(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}
