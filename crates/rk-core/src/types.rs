//! Core domain types

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ArtifactError;

/// Port used when a draft leaves the SSH port unset (0)
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Surrogate identifier of a persisted host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub i64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for HostId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Surrogate identifier of a persisted package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub i64);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PackageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// SSH connection triple; unique across all registered hosts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// IP address or hostname
    pub address: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub username: String,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(address: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            username: username.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.address, self.port)
    }
}

/// Validated input for creating or updating a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDraft {
    /// Unique display name
    pub name: String,
    /// Free-form category
    pub label: String,
    /// Connection address
    pub address: String,
    /// Connection port (0 means the SSH default)
    pub port: u16,
    /// Connection user
    pub username: String,
    /// Remote interpreter used by automation (e.g. `/usr/bin/python3`)
    pub interpreter: Option<String>,
    /// Free-text remark
    pub remark: String,
}

impl HostDraft {
    /// Connection triple, with port 0 normalized to 22
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.effective_port(), self.username.clone())
    }

    /// Port with 0 normalized to [`DEFAULT_SSH_PORT`]
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }
}

/// A persisted, SSH-reachable managed machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub label: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub interpreter: Option<String>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Host {
    /// Connection triple of this host
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port, self.username.clone())
    }
}

/// Partial host update; `None` leaves a column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPatch {
    pub name: Option<String>,
    pub label: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub interpreter: Option<Option<String>>,
    pub remark: Option<String>,
}

impl HostPatch {
    /// Patch that overwrites every mutable column with the draft's values
    pub fn from_draft(draft: &HostDraft) -> Self {
        Self {
            name: Some(draft.name.clone()),
            label: Some(draft.label.clone()),
            address: Some(draft.address.clone()),
            port: Some(draft.effective_port()),
            username: Some(draft.username.clone()),
            interpreter: Some(draft.interpreter.clone()),
            remark: Some(draft.remark.clone()),
        }
    }

    /// True when no column would change
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// System-assigned name addressing a stored artifact.
///
/// Always a bare file name: a UUID plus the extension of the uploaded file.
/// User-supplied names never reach the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageName(String);

impl StorageName {
    /// Generate a collision-resistant name keeping `original`'s extension
    pub fn generate(original_filename: &str) -> Self {
        let id = Uuid::new_v4();
        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 16)
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()));

        match ext {
            Some(ext) => Self(format!("{}.{}", id, ext)),
            None => Self(id.to_string()),
        }
    }

    /// Accept an existing name, rejecting anything that is not a bare file name
    pub fn parse(name: impl Into<String>) -> Result<Self, ArtifactError> {
        let name = name.into();
        let bad = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
            || name.len() > 255;
        if bad {
            return Err(ArtifactError::InvalidName(name));
        }
        Ok(Self(name))
    }

    /// The raw name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StorageName {
    type Error = ArtifactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<StorageName> for String {
    fn from(name: StorageName) -> Self {
        name.0
    }
}

/// Record to insert for a freshly stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPackage {
    pub label: String,
    pub version: String,
    pub storage_name: StorageName,
    pub original_filename: String,
}

/// A persisted uploaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub label: String,
    pub version: String,
    pub storage_name: StorageName,
    /// Name shown to users and offered on download; never used for storage
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Partial package update; the storage name is immutable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePatch {
    pub label: Option<String>,
    pub version: Option<String>,
}

impl PackagePatch {
    /// True when no column would change
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.version.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(port: u16) -> HostDraft {
        HostDraft {
            name: "db-1".into(),
            label: "db".into(),
            address: "10.0.0.5".into(),
            port,
            username: "admin".into(),
            interpreter: None,
            remark: String::new(),
        }
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("10.0.0.5", 22, "admin");
        assert_eq!(endpoint.to_string(), "admin@10.0.0.5:22");
    }

    #[test]
    fn test_zero_port_defaults_to_ssh() {
        assert_eq!(draft(0).endpoint().port, 22);
        assert_eq!(draft(2222).endpoint().port, 2222);
        assert_eq!(HostPatch::from_draft(&draft(0)).port, Some(22));
    }

    #[test]
    fn test_storage_name_keeps_extension() {
        let name = StorageName::generate("agent-1.2.0.tar.gz");
        assert!(name.as_str().ends_with(".gz"));
        assert_ne!(name.as_str(), "agent-1.2.0.tar.gz");
        assert!(StorageName::parse(name.as_str()).is_ok());
    }

    #[test]
    fn test_storage_name_drops_hostile_extension() {
        let name = StorageName::generate("../../etc/passwd");
        assert!(!name.as_str().contains('/'));

        let name = StorageName::generate("payload.sh;rm -rf");
        assert!(!name.as_str().contains(' '));
    }

    #[test]
    fn test_storage_names_are_unique() {
        let a = StorageName::generate("a.zip");
        let b = StorageName::generate("a.zip");
        assert_ne!(a, b);
    }

    #[test]
    fn test_storage_name_rejects_paths() {
        for bad in ["", "..", ".hidden", "a/b", "a\\b", "../x"] {
            assert!(StorageName::parse(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_empty_patch() {
        assert!(HostPatch::default().is_empty());
        assert!(!HostPatch::from_draft(&draft(22)).is_empty());
        assert!(PackagePatch::default().is_empty());
    }
}
