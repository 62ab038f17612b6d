//! # noipam-network
//!
//! Host link primitives for the noipam driver.
//!
//! The [`LinkBackend`] trait is the seam between the driver core and the
//! host: [`IpLinks`] drives `ip(8)`, [`MemoryLinks`] keeps an in-process
//! interface table for tests and dry runs.

#![warn(missing_docs)]

pub mod ifname;
pub mod link;
pub mod mac;
pub mod memory;
pub mod modes;
pub mod netns;
pub mod vlan;

pub use ifname::{IFNAME_MAX_LEN, generate_interface_name};
pub use link::{IpLinks, LinkBackend};
pub use mac::{MacAddress, MacParseError};
pub use memory::{LinkKind, LinkOp, MemoryLinks};
pub use modes::MacvlanMode;
pub use netns::NetnsScope;
pub use vlan::VlanSubinterface;
