//! Filesystem-side accessor traits

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ArtifactError, InventoryError};
use crate::types::{Host, HostId, StorageName};

/// Physical storage for uploaded packages, addressed only by [`StorageName`]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `content` under `name`; never overwrites an existing object
    async fn write(&self, name: &StorageName, content: &[u8]) -> Result<(), ArtifactError>;

    /// Read the object stored under `name`
    async fn read(&self, name: &StorageName) -> Result<Bytes, ArtifactError>;

    /// Remove the object; an absent object counts as removed
    async fn remove(&self, name: &StorageName) -> Result<(), ArtifactError>;

    /// Location of the object on disk
    fn path(&self, name: &StorageName) -> PathBuf;
}

/// File-based automation inventory, one entry per host
#[async_trait]
pub trait InventoryExporter: Send + Sync {
    /// Regenerate the entry for `host` and return its path
    async fn export(&self, host: &Host) -> Result<PathBuf, InventoryError>;

    /// Remove the entry for `id`; an absent entry counts as removed
    async fn remove(&self, id: HostId) -> Result<(), InventoryError>;

    /// Location of the entry for `id`
    fn path(&self, id: HostId) -> PathBuf;
}
