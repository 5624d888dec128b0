//! Accessor trait definitions
//!
//! The lifecycle managers only ever see these traits, so tests can swap the
//! SQLite and filesystem implementations for in-memory fakes.

mod repository;
mod storage;

pub use repository::{HostRepository, PackageRepository};
pub use storage::{ArtifactStore, InventoryExporter};
