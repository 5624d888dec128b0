//! Resource service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Top-level configuration, loaded once at process start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Relational storage
    pub database: DatabaseConfig,
    /// Trust bootstrapping over SSH
    pub ssh: SshConfig,
    /// Inventory and artifact directories
    pub storage: StorageConfig,
}

impl ResourceConfig {
    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::MissingField("database.url".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("database.read_timeout", self.database.read_timeout),
            ("database.write_timeout", self.database.write_timeout),
            ("database.list_timeout", self.database.list_timeout),
            ("ssh.timeout", self.ssh.timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if self.ssh.public_key_paths.is_empty() {
            return Err(ConfigError::MissingField("ssh.public_key_paths".into()));
        }
        Ok(())
    }
}

/// Database connection and per-call timeout budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite:///var/lib/rk/resource.db`
    pub url: String,

    /// Pool size
    pub max_connections: u32,

    /// Budget for single-record reads
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,

    /// Budget for inserts, updates and deletes
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,

    /// Budget for list queries (count + page)
    #[serde(with = "duration_secs")]
    pub list_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let db_path = super::default_config_dir().join("resource.db");

        Self {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 5,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            list_timeout: Duration::from_secs(15),
        }
    }
}

/// System key material and SSH timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Private key used for passwordless authentication.
    ///
    /// A bare file name resolves under `~/.ssh/`.
    pub private_key_path: PathBuf,

    /// Public keys deployed to every managed host; at least one is required
    pub public_key_paths: Vec<PathBuf>,

    /// Timeout applied to each dial and each remote command
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Verify host keys against this file; unset accepts any host key
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("id_ed25519"),
            public_key_paths: vec![PathBuf::from("id_ed25519.pub")],
            timeout: Duration::from_secs(10),
            known_hosts_path: None,
        }
    }
}

/// Local directories for inventory entries and uploaded packages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; `host_vars/` and `packages/` live below it
    pub root: PathBuf,

    /// Largest accepted upload in bytes
    pub max_upload_size: u64,
}

impl StorageConfig {
    /// Directory holding one inventory entry per host
    pub fn host_vars_dir(&self) -> PathBuf {
        self.root.join("host_vars")
    }

    /// Directory holding uploaded package objects
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: super::default_config_dir().join("storage"),
            max_upload_size: 1024 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ResourceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_public_keys_rejected() {
        let mut config = ResourceConfig::default();
        config.ssh.public_key_paths.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ResourceConfig::default();
        config.database.list_timeout = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.list_timeout"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ResourceConfig = toml::from_str(
            r#"
            [ssh]
            timeout = 3

            [storage]
            root = "/srv/rk"
            "#,
        )
        .unwrap();

        assert_eq!(config.ssh.timeout, Duration::from_secs(3));
        assert_eq!(config.storage.packages_dir(), PathBuf::from("/srv/rk/packages"));
        assert_eq!(config.storage.host_vars_dir(), PathBuf::from("/srv/rk/host_vars"));
        assert_eq!(config.database.read_timeout, Duration::from_secs(5));
    }
}
