//! Persistence traits

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::StorageError;
use crate::query::{HostFilter, ListQuery, PackageFilter, Page};
use crate::types::{Host, HostDraft, HostId, HostPatch, NewPackage, Package, PackageId, PackagePatch};

/// Host records
///
/// Every call is bounded by the implementation's timeout class for that
/// operation and aborts when `ctx` is cancelled.
#[async_trait]
pub trait HostRepository: Send + Sync {
    /// Insert a host and return it with its assigned id.
    ///
    /// Fails with [`StorageError::DuplicateKey`] when the name or the
    /// (address, port, username) triple is already registered.
    async fn create(&self, ctx: &RequestContext, draft: &HostDraft) -> Result<Host, StorageError>;

    /// Apply `patch` to host `id`
    async fn update(
        &self,
        ctx: &RequestContext,
        id: HostId,
        patch: &HostPatch,
    ) -> Result<(), StorageError>;

    /// Delete host `id`
    async fn delete(&self, ctx: &RequestContext, id: HostId) -> Result<(), StorageError>;

    /// Fetch host `id`
    async fn get(&self, ctx: &RequestContext, id: HostId) -> Result<Host, StorageError>;

    /// List hosts matching `filter`, with the total count of matches
    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &HostFilter,
        query: &ListQuery,
    ) -> Result<Page<Host>, StorageError>;
}

/// Package records
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Insert a package record; the storage name must be unique
    async fn create(
        &self,
        ctx: &RequestContext,
        package: &NewPackage,
    ) -> Result<Package, StorageError>;

    /// Apply `patch` to package `id`
    async fn update(
        &self,
        ctx: &RequestContext,
        id: PackageId,
        patch: &PackagePatch,
    ) -> Result<(), StorageError>;

    /// Delete package `id`
    async fn delete(&self, ctx: &RequestContext, id: PackageId) -> Result<(), StorageError>;

    /// Fetch package `id`
    async fn get(&self, ctx: &RequestContext, id: PackageId) -> Result<Package, StorageError>;

    /// List packages matching `filter`, with the total count of matches
    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &PackageFilter,
        query: &ListQuery,
    ) -> Result<Page<Package>, StorageError>;
}
