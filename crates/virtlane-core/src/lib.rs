//! # virtlane-core
//!
//! Machine state, address resolution and snapshot management for
//! libvirt-managed virtual machines.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       virtlane-core                        │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  ┌──────────────┐   ┌──────────────────┐                   │
//! │  │    Driver    │──▶│ StateReconciler  │──┐                │
//! │  │  - state()   │   └──────────────────┘  │                │
//! │  │  - address() │            │            ▼                │
//! │  │  - snapshots │            │   ┌──────────────────┐      │
//! │  └──────────────┘            │   │ AddressResolver  │      │
//! │         │                    │   │  agent | lease   │      │
//! │         ▼                    │   │  | neighbour tbl │      │
//! │  ┌──────────────┐            ▼   └──────────────────┘      │
//! │  │  Snapshot    │   ┌──────────────────┐   │               │
//! │  │  Manager     │──▶│ConnectionManager │◀──┘               │
//! │  └──────────────┘   │ primary | r/o    │                   │
//! │                     └──────────────────┘                   │
//! └────────────────────────────────│───────────────────────────┘
//!                                  ▼
//!                     virtlane-hypervisor (virsh)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use virtlane_core::{Driver, DriverConfig, MachineId, MachineState};
//!
//! # async fn example() -> virtlane_core::Result<()> {
//! let driver = Driver::new(DriverConfig::from_env())?;
//! let id = MachineId::from("5f2c3a1e-0000-4000-8000-000000000001");
//!
//! if driver.state(&id).await? == MachineState::Running {
//!     println!("address: {:?}", driver.address(&id).await?);
//! }
//!
//! driver.snapshots().create(&id, "clean").await?;
//! println!("snapshots: {:?}", driver.snapshots().list(&id).await?);
//! # Ok(())
//! # }
//! ```

pub mod address;
mod config;
mod connection;
mod driver;
mod error;
mod machine;
mod neighbor;
mod snapshot;
mod state;

pub use address::{AddressQuery, AddressResolver, AddressStrategy};
pub use config::{
    DriverConfig, DriverConfigBuilder, DEFAULT_ADDRESS_POLL_INTERVAL, DEFAULT_BOOT_TIMEOUT,
    DEFAULT_IP_COMMAND, DEFAULT_SESSION_URI, DEFAULT_STATE_ADDRESS_TIMEOUT, DEFAULT_URI,
};
pub use connection::ConnectionManager;
pub use driver::Driver;
pub use error::{CoreError, Result};
pub use machine::{normalize_state, MachineId, MachineState};
pub use neighbor::{CommandNeighborLookup, NeighborLookup};
pub use snapshot::{snapshot_xml, SnapshotManager, SNAPSHOT_DESCRIPTION};
pub use state::StateReconciler;
