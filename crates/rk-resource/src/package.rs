//! Package lifecycle
//!
//! Objects are written before their record exists and removed after their
//! record is gone, so a record never points at a missing object. A failed
//! step can leave an orphaned object behind, never a dangling record.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use rk_core::{
    ArtifactError, ArtifactStore, ListQuery, NewPackage, Package, PackageFilter, PackageId,
    PackagePatch, PackageRepository, Page, RequestContext, StorageName,
};

use crate::error::ResourceError;

/// An upload as received from the caller
#[derive(Debug, Clone)]
pub struct PackageUpload {
    pub label: String,
    pub version: String,
    /// Shown to users; never used to address the stored object
    pub original_filename: String,
    pub content: Bytes,
}

/// Orchestrates the artifact store and package records
pub struct PackageLifecycleManager {
    packages: Arc<dyn PackageRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    max_upload_size: u64,
}

impl PackageLifecycleManager {
    pub fn new(
        packages: Arc<dyn PackageRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        max_upload_size: u64,
    ) -> Self {
        Self {
            packages,
            artifacts,
            max_upload_size,
        }
    }

    /// Store the content, then record it
    pub async fn create(
        &self,
        ctx: &RequestContext,
        upload: PackageUpload,
    ) -> Result<Package, ResourceError> {
        let size = upload.content.len() as u64;
        if size > self.max_upload_size {
            return Err(ArtifactError::TooLarge {
                size,
                max: self.max_upload_size,
            }
            .into());
        }

        ctx.check()?;

        let storage_name = StorageName::generate(&upload.original_filename);
        tracing::info!(
            trace_id = %ctx.trace_id(),
            storage_name = %storage_name,
            size,
            "Storing package {} {}",
            upload.label,
            upload.version
        );

        ctx.run(self.artifacts.write(&storage_name, &upload.content))
            .await?
            .map_err(|e| {
                tracing::error!(trace_id = %ctx.trace_id(), storage_name = %storage_name, "Failed to store package: {}", e);
                ResourceError::from(e)
            })?;

        let record = NewPackage {
            label: upload.label,
            version: upload.version,
            storage_name,
            original_filename: upload.original_filename,
        };

        match self.packages.create(ctx, &record).await {
            Ok(package) => {
                tracing::info!(
                    trace_id = %ctx.trace_id(),
                    package_id = package.id.0,
                    "Package created"
                );
                Ok(package)
            }
            Err(e) => {
                tracing::error!(
                    trace_id = %ctx.trace_id(),
                    storage_name = %record.storage_name,
                    "Failed to save package record: {}",
                    e
                );
                if ctx.check().is_ok() {
                    self.discard(ctx, &record.storage_name).await;
                } else {
                    tracing::warn!(
                        trace_id = %ctx.trace_id(),
                        storage_name = %record.storage_name,
                        "Request aborted, leaving orphaned package object"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Remove the record, then its object.
    ///
    /// An object that is already gone counts as removed.
    pub async fn delete(&self, ctx: &RequestContext, id: PackageId) -> Result<(), ResourceError> {
        tracing::info!(trace_id = %ctx.trace_id(), package_id = id.0, "Deleting package");

        let package = self.packages.get(ctx, id).await?;

        self.packages.delete(ctx, id).await.map_err(|e| {
            tracing::error!(trace_id = %ctx.trace_id(), package_id = id.0, "Failed to delete package record: {}", e);
            ResourceError::from(e)
        })?;

        ctx.check()?;

        if let Err(e) = ctx.run(self.artifacts.remove(&package.storage_name)).await? {
            let path = self.artifacts.path(&package.storage_name);
            tracing::error!(
                trace_id = %ctx.trace_id(),
                package_id = id.0,
                path = ?path,
                "Package record deleted but object remains: {}",
                e
            );
            return Err(ResourceError::cleanup(path.display().to_string(), e));
        }

        tracing::info!(trace_id = %ctx.trace_id(), package_id = id.0, "Package deleted");
        Ok(())
    }

    /// Fetch one package record
    pub async fn find(&self, ctx: &RequestContext, id: PackageId) -> Result<Package, ResourceError> {
        Ok(self.packages.get(ctx, id).await?)
    }

    /// List package records
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &PackageFilter,
        query: &ListQuery,
    ) -> Result<Page<Package>, ResourceError> {
        Ok(self.packages.list(ctx, filter, query).await?)
    }

    /// Fetch a record together with the stored bytes
    pub async fn download(
        &self,
        ctx: &RequestContext,
        id: PackageId,
    ) -> Result<(Package, Bytes), ResourceError> {
        let package = self.packages.get(ctx, id).await?;
        let content = ctx.run(self.artifacts.read(&package.storage_name)).await??;
        Ok((package, content))
    }

    /// Change label and/or version; the stored object is untouched
    pub async fn update_metadata(
        &self,
        ctx: &RequestContext,
        id: PackageId,
        patch: &PackagePatch,
    ) -> Result<Package, ResourceError> {
        self.packages.update(ctx, id, patch).await?;
        Ok(self.packages.get(ctx, id).await?)
    }

    /// Where the object of `package` lives
    pub fn path(&self, package: &Package) -> PathBuf {
        self.artifacts.path(&package.storage_name)
    }

    /// Best-effort removal of an object whose record was never written
    async fn discard(&self, ctx: &RequestContext, name: &StorageName) {
        if let Err(e) = self.artifacts.remove(name).await {
            tracing::warn!(
                trace_id = %ctx.trace_id(),
                storage_name = %name,
                "Failed to remove orphaned package object: {}",
                e
            );
        }
    }
}
