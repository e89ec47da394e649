//! # virtlane-hypervisor
//!
//! Hypervisor client boundary for virtlane.
//!
//! The traits in this crate are the only way the rest of virtlane talks to
//! the hypervisor: connections, domains, snapshots and virtual networks.
//! [`VirshConnector`] implements them on top of the `virsh` command line tool.
//!
//! ## Quick Start
//!
//! ```no_run
//! use virtlane_hypervisor::{ConnectParams, Connector, VirshConnector};
//!
//! # async fn example() -> virtlane_hypervisor::Result<()> {
//! let connector = VirshConnector::new();
//! let conn = connector.connect(&ConnectParams::new("qemu:///system")).await?;
//!
//! let domain = conn.lookup_domain("5f2c3a1e-0000-4000-8000-000000000001").await?;
//! println!("state: {:?}", domain.state().await?);
//! println!("mac:   {}", domain.mac().await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod traits;
mod types;
mod virsh;

pub use error::{HypervisorError, Result};
pub use traits::{Connection, Connector, Domain, DomainSnapshot, Network};
pub use types::{ConnectParams, Lease};
pub use virsh::VirshConnector;
