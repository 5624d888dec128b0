//! rk-store: storage accessors for resource-keeper
//!
//! Concrete implementations of the `rk-core` accessor traits:
//!
//! - [`SqliteHostRepository`] and [`SqlitePackageRepository`] keep the
//!   authoritative records, each call bounded by a read, write or list
//!   timeout.
//! - [`FsArtifactStore`] holds uploaded package bytes by storage name.
//! - [`YamlInventoryExporter`] writes one `host_vars` file per host.
//!
//! None of these carry policy; ordering and failure handling live in the
//! lifecycle managers.

pub mod artifact;
pub mod db;
pub mod host_repo;
pub mod inventory;
pub mod package_repo;

pub use artifact::FsArtifactStore;
pub use db::{connect, migrate, Timeouts};
pub use host_repo::SqliteHostRepository;
pub use inventory::YamlInventoryExporter;
pub use package_repo::SqlitePackageRepository;
pub use sqlx::SqlitePool;
