//! Lifecycle error type

use rk_core::{ArtifactError, Cancelled, HostId, StorageError};
use rk_trust::TrustError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a lifecycle call reports; each variant names the step that failed
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Trust could not be established; nothing was created or changed
    #[error(transparent)]
    Trust(TrustError),

    /// The database rejected or failed the call
    #[error(transparent)]
    Storage(StorageError),

    /// The artifact store rejected or failed the call
    #[error(transparent)]
    Artifact(ArtifactError),

    /// The host record was saved but its inventory entry was not written
    #[error("Host {host_id} saved but inventory export failed: {source}")]
    ExportFailed {
        host_id: HostId,
        #[source]
        source: rk_core::InventoryError,
    },

    /// The record is gone but its file could not be removed
    #[error("Record removed but cleanup of {target} failed: {source}")]
    CleanupFailed {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The request was cancelled or ran past its deadline
    #[error("Request aborted: {0}")]
    Cancelled(Cancelled),
}

impl ResourceError {
    /// True when a uniqueness constraint rejected the call
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, ResourceError::Storage(e) if e.is_duplicate_key())
    }

    /// True when the addressed record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::Storage(e) if e.is_not_found())
    }

    /// True for caller cancellation or deadline expiry
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResourceError::Cancelled(_))
    }

    pub(crate) fn cleanup(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ResourceError::CleanupFailed {
            target: target.into(),
            source: source.into(),
        }
    }
}

impl From<Cancelled> for ResourceError {
    fn from(cancelled: Cancelled) -> Self {
        ResourceError::Cancelled(cancelled)
    }
}

impl From<TrustError> for ResourceError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::Cancelled(c) => ResourceError::Cancelled(c),
            other => ResourceError::Trust(other),
        }
    }
}

impl From<StorageError> for ResourceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled(c) => ResourceError::Cancelled(c),
            other => ResourceError::Storage(other),
        }
    }
}

impl From<ArtifactError> for ResourceError {
    fn from(err: ArtifactError) -> Self {
        ResourceError::Artifact(err)
    }
}
