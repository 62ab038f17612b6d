//! # noipam-common
//!
//! Shared types for the noipam macvlan driver:
//! - The error taxonomy used by every lifecycle operation
//! - Validated network and endpoint identifiers
//! - Standard filesystem paths

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;

pub use error::{ErrorKind, NoipamError, NoipamResult};
pub use id::{ObjectId, truncate_id};
pub use paths::NoipamPaths;
