//! # noipam
//!
//! A macvlan network driver core that leaves IP address management to
//! someone else.
//!
//! The [`Driver`] turns container runtime lifecycle requests into host
//! link changes and persisted records:
//!
//! - [`options`] validates the runtime's option bag into a
//!   [`NetworkConfiguration`]
//! - [`provision`] makes sure the parent link exists and remembers whether
//!   the driver created it
//! - [`registry`] tracks networks and claims parents
//! - [`endpoint`] attaches and detaches container interfaces
//! - [`coordinator`] mirrors networks and endpoints into a [`Store`]
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use noipam::{CreateNetworkRequest, Driver, DriverConfig, MemoryStore};
//! use noipam_network::MemoryLinks;
//!
//! # fn example() -> noipam_common::NoipamResult<()> {
//! let driver = Driver::new(
//!     DriverConfig::default(),
//!     Arc::new(MemoryLinks::with_physical(["eth0"])),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let request = CreateNetworkRequest::new("net1").with_option("parent", "eth0.10");
//! driver.create_network(&request)?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod endpoint;
pub mod options;
pub mod provision;
pub mod registry;
pub mod store;

pub use api::{
    Capabilities, CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest,
    EndpointInfo, EndpointInterface, InterfaceName, JoinResult, NetworkCreation, RestoreReport,
    Scope,
};
pub use config::DriverConfig;
pub use driver::Driver;
pub use endpoint::{Endpoint, EndpointState};
pub use options::{NetworkConfiguration, PoolDescriptor, RawOptions};
pub use registry::{Network, NetworkRegistry};
pub use store::{FileStore, MemoryStore, RecordKind, Store, StoreKey, StoreRecord};
