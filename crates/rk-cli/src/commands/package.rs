//! Package command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;

use rk_core::{ListQuery, PackageFilter, PackageId, PackagePatch, RequestContext};
use rk_resource::{PackageUpload, ResourceError, ResourceState};

use crate::output::{format_package, format_packages, print_info, print_success, print_warning};

/// Upload a file as a new package
pub async fn package_upload(
    state: &ResourceState,
    ctx: &RequestContext,
    file: &Path,
    label: String,
    version: String,
) -> Result<()> {
    let original_filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Not a file name: {:?}", file))?;

    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;

    let package = state
        .packages
        .create(
            ctx,
            PackageUpload {
                label,
                version,
                original_filename,
                content: Bytes::from(content),
            },
        )
        .await
        .map_err(|e| report(e, "upload package"))?;

    print_success(&format!(
        "Uploaded package {} ({} {})",
        package.id, package.label, package.version
    ));
    Ok(())
}

/// Delete a package record and its stored object
pub async fn package_remove(
    state: &ResourceState,
    ctx: &RequestContext,
    id: PackageId,
) -> Result<()> {
    state
        .packages
        .delete(ctx, id)
        .await
        .map_err(|e| report(e, "remove package"))?;
    print_success(&format!("Removed package {}", id));
    Ok(())
}

/// Show one package
pub async fn package_show(state: &ResourceState, ctx: &RequestContext, id: PackageId) -> Result<()> {
    let package = state
        .packages
        .find(ctx, id)
        .await
        .map_err(|e| report(e, "show package"))?;
    println!("{}", format_package(&package));
    print_info(&format!("Stored at {}", state.packages.path(&package).display()));
    Ok(())
}

/// List packages
pub async fn package_list(
    state: &ResourceState,
    ctx: &RequestContext,
    filter: &PackageFilter,
    query: &ListQuery,
) -> Result<()> {
    let page = state
        .packages
        .list(ctx, filter, query)
        .await
        .map_err(|e| report(e, "list packages"))?;
    println!("{}", format_packages(&page));
    Ok(())
}

/// Write a package's content to `output`, or to its original name in the
/// current directory
pub async fn package_download(
    state: &ResourceState,
    ctx: &RequestContext,
    id: PackageId,
    output: Option<PathBuf>,
) -> Result<()> {
    let (package, content) = state
        .packages
        .download(ctx, id)
        .await
        .map_err(|e| report(e, "download package"))?;

    // The stored display name is user input; keep only its last component
    let target = match output {
        Some(path) => path,
        None => Path::new(&package.original_filename)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(package.storage_name.as_str())),
    };

    tokio::fs::write(&target, &content)
        .await
        .with_context(|| format!("Failed to write {:?}", target))?;

    print_success(&format!(
        "Saved {} bytes to {}",
        content.len(),
        target.display()
    ));
    Ok(())
}

/// Change a package's label and/or version
pub async fn package_update(
    state: &ResourceState,
    ctx: &RequestContext,
    id: PackageId,
    patch: &PackagePatch,
) -> Result<()> {
    if patch.is_empty() {
        print_warning("Nothing to update; pass --label and/or --version");
        return Ok(());
    }

    let package = state
        .packages
        .update_metadata(ctx, id, patch)
        .await
        .map_err(|e| report(e, "update package"))?;
    print_success(&format!(
        "Updated package {} ({} {})",
        package.id, package.label, package.version
    ));
    Ok(())
}

fn report(err: ResourceError, action: &str) -> anyhow::Error {
    if let ResourceError::CleanupFailed { target, .. } = &err {
        print_warning(&format!("Record removed; delete {} by hand", target));
    }
    anyhow::Error::new(err).context(format!("Failed to {}", action))
}
