//! Host lifecycle
//!
//! Create: trust check, insert, export. Update: trust check against the new
//! endpoint, patch, re-export. Delete: remove record, then the entry.
//!
//! Failures and what they leave behind:
//!
//! - trust check: [`ResourceError::Trust`], nothing changed
//! - insert or patch: [`ResourceError::Storage`], nothing new
//! - export: [`ResourceError::ExportFailed`], record without an entry
//! - record delete: [`ResourceError::Storage`], record and entry intact
//! - entry removal: [`ResourceError::CleanupFailed`], orphaned entry

use std::path::PathBuf;
use std::sync::Arc;

use rk_core::{
    Host, HostDraft, HostFilter, HostId, HostPatch, HostRepository, InventoryExporter, ListQuery,
    Page, RequestContext,
};
use rk_trust::{HostTrustManager, TrustOutcome, TrustStore};

use crate::error::ResourceError;

/// Host operations that never contact the host: removal, inventory
/// export and reads. Usable without SSH key material.
#[derive(Clone)]
pub struct HostRecords {
    hosts: Arc<dyn HostRepository>,
    inventory: Arc<dyn InventoryExporter>,
}

impl HostRecords {
    pub fn new(hosts: Arc<dyn HostRepository>, inventory: Arc<dyn InventoryExporter>) -> Self {
        Self { hosts, inventory }
    }

    /// Remove the record, then its inventory entry
    pub async fn delete(&self, ctx: &RequestContext, id: HostId) -> Result<(), ResourceError> {
        tracing::info!(trace_id = %ctx.trace_id(), host_id = id.0, "Deleting host");

        self.hosts.delete(ctx, id).await.map_err(|e| {
            tracing::error!(trace_id = %ctx.trace_id(), host_id = id.0, "Failed to delete host: {}", e);
            ResourceError::from(e)
        })?;

        ctx.check()?;

        let path = self.inventory.path(id);
        if let Err(e) = ctx.run(self.inventory.remove(id)).await? {
            tracing::error!(
                trace_id = %ctx.trace_id(),
                host_id = id.0,
                path = ?path,
                "Host deleted but inventory entry remains: {}",
                e
            );
            return Err(ResourceError::cleanup(path.display().to_string(), e));
        }

        tracing::info!(trace_id = %ctx.trace_id(), host_id = id.0, "Host deleted");
        Ok(())
    }

    /// Rewrite the inventory entry of a persisted host.
    ///
    /// Completes a create or update that returned `ExportFailed`.
    pub async fn export_inventory(
        &self,
        ctx: &RequestContext,
        id: HostId,
    ) -> Result<PathBuf, ResourceError> {
        let host = self.hosts.get(ctx, id).await?;
        self.export(ctx, &host).await
    }

    pub async fn find(&self, ctx: &RequestContext, id: HostId) -> Result<Host, ResourceError> {
        Ok(self.hosts.get(ctx, id).await?)
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &HostFilter,
        query: &ListQuery,
    ) -> Result<Page<Host>, ResourceError> {
        Ok(self.hosts.list(ctx, filter, query).await?)
    }

    async fn export(&self, ctx: &RequestContext, host: &Host) -> Result<PathBuf, ResourceError> {
        ctx.check()?;

        match ctx.run(self.inventory.export(host)).await? {
            Ok(path) => {
                tracing::info!(
                    trace_id = %ctx.trace_id(),
                    host_id = host.id.0,
                    path = ?path,
                    "Inventory entry written"
                );
                Ok(path)
            }
            Err(source) => {
                tracing::error!(
                    trace_id = %ctx.trace_id(),
                    host_id = host.id.0,
                    "Inventory export failed: {}",
                    source
                );
                Err(ResourceError::ExportFailed {
                    host_id: host.id,
                    source,
                })
            }
        }
    }
}

/// Orchestrates trust checks, host records and inventory entries
pub struct HostLifecycleManager<S: TrustStore> {
    trust: HostTrustManager<S>,
    records: HostRecords,
}

impl<S: TrustStore> HostLifecycleManager<S> {
    pub fn new(
        trust: HostTrustManager<S>,
        hosts: Arc<dyn HostRepository>,
        inventory: Arc<dyn InventoryExporter>,
    ) -> Self {
        Self {
            trust,
            records: HostRecords::new(hosts, inventory),
        }
    }

    /// The trust manager, for explicit re-checks
    pub fn trust(&self) -> &HostTrustManager<S> {
        &self.trust
    }

    /// The operations that need no SSH access
    pub fn records(&self) -> &HostRecords {
        &self.records
    }

    /// Verify trust, insert the record, export its inventory entry
    pub async fn create(
        &self,
        ctx: &RequestContext,
        draft: &HostDraft,
        password: &str,
    ) -> Result<Host, ResourceError> {
        let endpoint = draft.endpoint();
        tracing::info!(
            trace_id = %ctx.trace_id(),
            endpoint = %endpoint,
            name = %draft.name,
            "Creating host"
        );

        self.verify_trust(ctx, draft, password).await?;

        let host = self.records.hosts.create(ctx, draft).await.map_err(|e| {
            tracing::error!(trace_id = %ctx.trace_id(), endpoint = %endpoint, "Failed to save host: {}", e);
            ResourceError::from(e)
        })?;

        self.records.export(ctx, &host).await?;

        tracing::info!(trace_id = %ctx.trace_id(), host_id = host.id.0, "Host created");
        Ok(host)
    }

    /// Verify trust against the new endpoint, then patch the record and
    /// regenerate its inventory entry.
    ///
    /// The old endpoint is never trusted implicitly.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: HostId,
        draft: &HostDraft,
        password: &str,
    ) -> Result<Host, ResourceError> {
        tracing::info!(
            trace_id = %ctx.trace_id(),
            host_id = id.0,
            endpoint = %draft.endpoint(),
            "Updating host"
        );

        // Unknown ids fail before any SSH traffic
        self.records.hosts.get(ctx, id).await?;

        self.verify_trust(ctx, draft, password).await?;

        self.records
            .hosts
            .update(ctx, id, &HostPatch::from_draft(draft))
            .await
            .map_err(|e| {
                tracing::error!(trace_id = %ctx.trace_id(), host_id = id.0, "Failed to update host: {}", e);
                ResourceError::from(e)
            })?;

        let host = self.records.hosts.get(ctx, id).await?;
        self.records.export(ctx, &host).await?;

        tracing::info!(trace_id = %ctx.trace_id(), host_id = id.0, "Host updated");
        Ok(host)
    }

    /// See [`HostRecords::delete`]
    pub async fn delete(&self, ctx: &RequestContext, id: HostId) -> Result<(), ResourceError> {
        self.records.delete(ctx, id).await
    }

    /// See [`HostRecords::export_inventory`]
    pub async fn export_inventory(
        &self,
        ctx: &RequestContext,
        id: HostId,
    ) -> Result<PathBuf, ResourceError> {
        self.records.export_inventory(ctx, id).await
    }

    pub async fn find(&self, ctx: &RequestContext, id: HostId) -> Result<Host, ResourceError> {
        self.records.find(ctx, id).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &HostFilter,
        query: &ListQuery,
    ) -> Result<Page<Host>, ResourceError> {
        self.records.list(ctx, filter, query).await
    }

    async fn verify_trust(
        &self,
        ctx: &RequestContext,
        draft: &HostDraft,
        password: &str,
    ) -> Result<TrustOutcome, ResourceError> {
        let endpoint = draft.endpoint();
        self.trust
            .establish_trust(ctx, &endpoint, password)
            .await
            .map_err(|e| {
                tracing::error!(
                    trace_id = %ctx.trace_id(),
                    endpoint = %endpoint,
                    "Trust check failed: {}",
                    e
                );
                ResourceError::from(e)
            })
    }
}
