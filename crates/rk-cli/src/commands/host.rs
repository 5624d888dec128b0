//! Host command implementations

use anyhow::{Context, Result};

use rk_core::{HostDraft, HostFilter, HostId, HostRepository, ListQuery, RequestContext};
use rk_resource::{ResourceError, ResourceState};

use crate::output::{format_host, format_hosts, print_error, print_success, print_warning};

/// Register a new host, bootstrapping SSH trust first
pub async fn host_add(
    state: &ResourceState,
    ctx: &RequestContext,
    draft: &HostDraft,
    password: &str,
) -> Result<()> {
    let manager = state
        .host_manager()
        .context("Failed to load SSH keys")?;

    match manager.create(ctx, draft, password).await {
        Ok(host) => {
            print_success(&format!("Registered host {} ({})", host.id, host.endpoint()));
            Ok(())
        }
        Err(e) => Err(report(e, "register host")),
    }
}

/// Re-verify trust with new parameters, then update the host
pub async fn host_update(
    state: &ResourceState,
    ctx: &RequestContext,
    id: HostId,
    draft: &HostDraft,
    password: &str,
) -> Result<()> {
    let manager = state
        .host_manager()
        .context("Failed to load SSH keys")?;

    match manager.update(ctx, id, draft, password).await {
        Ok(host) => {
            print_success(&format!("Updated host {} ({})", host.id, host.endpoint()));
            Ok(())
        }
        Err(e) => Err(report(e, "update host")),
    }
}

/// Delete a host and its inventory entry
pub async fn host_remove(state: &ResourceState, ctx: &RequestContext, id: HostId) -> Result<()> {
    match state.host_records().delete(ctx, id).await {
        Ok(()) => {
            print_success(&format!("Removed host {}", id));
            Ok(())
        }
        Err(e) => Err(report(e, "remove host")),
    }
}

/// Rewrite the inventory entry of a host
pub async fn host_export(state: &ResourceState, ctx: &RequestContext, id: HostId) -> Result<()> {
    let path = state
        .host_records()
        .export_inventory(ctx, id)
        .await
        .map_err(|e| report(e, "export host"))?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}

/// Show one host
pub async fn host_show(state: &ResourceState, ctx: &RequestContext, id: HostId) -> Result<()> {
    let host = state
        .hosts
        .get(ctx, id)
        .await
        .map_err(|e| report(e.into(), "show host"))?;
    println!("{}", format_host(&host));
    Ok(())
}

/// List hosts
pub async fn host_list(
    state: &ResourceState,
    ctx: &RequestContext,
    filter: &HostFilter,
    query: &ListQuery,
) -> Result<()> {
    let page = state
        .hosts
        .list(ctx, filter, query)
        .await
        .map_err(|e| report(e.into(), "list hosts"))?;
    println!("{}", format_hosts(&page));
    Ok(())
}

/// Print a lifecycle error with a remediation hint and convert it for `main`
fn report(err: ResourceError, action: &str) -> anyhow::Error {
    match &err {
        ResourceError::ExportFailed { host_id, .. } => {
            print_warning(&format!(
                "Host {} is saved; run 'rk host export {}' to retry the inventory entry",
                host_id, host_id
            ));
        }
        ResourceError::CleanupFailed { target, .. } => {
            print_warning(&format!("Record removed; delete {} by hand", target));
        }
        e if e.is_duplicate_key() => {
            print_error("A host with this name or endpoint is already registered");
        }
        _ => {}
    }
    anyhow::Error::new(err).context(format!("Failed to {}", action))
}
