//! Core error types for resource-keeper

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::context::Cancelled;

/// Persistence-layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// A uniqueness constraint was violated
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// No record matched
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The operation exceeded its timeout budget
    #[error("Database {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The list query cannot be expressed (e.g. its offset overflows)
    #[error("Invalid list query: {0}")]
    InvalidQuery(String),

    /// Any other backend failure
    #[error("Database error: {0}")]
    Backend(String),

    /// The request was cancelled before or during the call
    #[error("Database call aborted: {0}")]
    Cancelled(#[from] Cancelled),
}

impl StorageError {
    /// True for uniqueness violations
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::DuplicateKey(_))
    }

    /// True when no record matched
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Artifact store (filesystem) errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The storage name is not a plain file name
    #[error("Invalid storage name: {0:?}")]
    InvalidName(String),

    /// Upload exceeds the configured size limit
    #[error("Artifact of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    /// Writing the object failed
    #[error("Failed to write artifact {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the object failed
    #[error("Failed to read artifact {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Removing the object failed for a reason other than absence
    #[error("Failed to remove artifact {name}: {source}")]
    Remove {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Inventory export errors
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Filesystem failure while writing or removing an entry
    #[error("Inventory I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entry could not be serialized
    #[error("Inventory serialization error: {0}")]
    Serialize(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
