//! Ansible-style `host_vars` exporter
//!
//! Each host gets `host_<id>.yaml` holding its connection variables. The
//! file is rewritten in full on every export and replaced atomically, so
//! readers never see a partial entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rk_core::{Host, HostId, InventoryError, InventoryExporter};

/// Variables written for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVars {
    pub host_id: i64,
    pub ansible_host: String,
    pub ansible_port: u16,
    pub ansible_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_python_interpreter: Option<String>,
}

impl From<&Host> for HostVars {
    fn from(host: &Host) -> Self {
        Self {
            host_id: host.id.0,
            ansible_host: host.address.clone(),
            ansible_port: host.port,
            ansible_user: host.username.clone(),
            ansible_python_interpreter: host.interpreter.clone(),
        }
    }
}

/// Writes one YAML file per host under a `host_vars` directory
#[derive(Debug, Clone)]
pub struct YamlInventoryExporter {
    dir: PathBuf,
}

impl YamlInventoryExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> InventoryError + '_ {
        move |source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl InventoryExporter for YamlInventoryExporter {
    async fn export(&self, host: &Host) -> Result<PathBuf, InventoryError> {
        let vars = HostVars::from(host);
        let yaml =
            serde_yaml::to_string(&vars).map_err(|e| InventoryError::Serialize(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_err(&self.dir))?;

        let path = self.path(host.id);
        let tmp = self.dir.join(format!(".host_{}.yaml.tmp", host.id));
        tokio::fs::write(&tmp, yaml).await.map_err(Self::io_err(&tmp))?;
        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Self::io_err(&path)(source));
        }

        tracing::debug!(host_id = host.id.0, path = ?path, "Exported inventory entry");
        Ok(path)
    }

    async fn remove(&self, id: HostId) -> Result<(), InventoryError> {
        let path = self.path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Self::io_err(&path)(source)),
        }
    }

    fn path(&self, id: HostId) -> PathBuf {
        self.dir.join(format!("host_{}.yaml", id))
    }
}
