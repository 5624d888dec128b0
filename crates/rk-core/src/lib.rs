//! rk-core: Core abstractions and configuration for resource-keeper
//!
//! This crate provides the domain types (hosts, packages, list queries), the
//! error taxonomy shared by the storage accessors, the request context used
//! for cancellation, and the narrow accessor traits the lifecycle managers
//! are written against.

pub mod config;
pub mod context;
pub mod error;
pub mod query;
pub mod traits;
pub mod types;

pub use context::{Cancelled, RequestContext};
pub use error::{ArtifactError, ConfigError, InventoryError, StorageError};
pub use query::{HostFilter, ListQuery, Page, PackageFilter, SortOrder};
pub use traits::{ArtifactStore, HostRepository, InventoryExporter, PackageRepository};
pub use types::{
    Endpoint, Host, HostDraft, HostId, HostPatch, NewPackage, Package, PackageId, PackagePatch,
    StorageName, DEFAULT_SSH_PORT,
};
