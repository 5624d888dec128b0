//! rk-resource: Host and package lifecycle management
//!
//! The lifecycle managers are the only place where ordering across the
//! network, the database and the filesystem is decided:
//!
//! - hosts: trust check, then record, then inventory entry; deletion removes
//!   the record before the entry.
//! - packages: object first, then record; deletion removes the record
//!   before the object.
//!
//! When a step fails after an earlier one committed, the filesystem side is
//! the one left behind, and the error names the step.

pub mod error;
pub mod host;
pub mod package;
pub mod state;

pub use error::ResourceError;
pub use host::{HostLifecycleManager, HostRecords};
pub use package::{PackageLifecycleManager, PackageUpload};
pub use state::ResourceState;
