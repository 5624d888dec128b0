//! Filesystem artifact store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use rk_core::{ArtifactError, ArtifactStore, StorageName};

/// Package objects stored as flat files under one directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the objects
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, name: &StorageName, content: &[u8]) -> Result<(), ArtifactError> {
        let write_err = |source| ArtifactError::Write {
            name: name.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;

        let path = self.path(name);
        if let Err(source) = Self::write_new(&path, content).await {
            // Leave nothing half-written behind, unless the name was already taken
            if source.kind() != ErrorKind::AlreadyExists {
                let _ = tokio::fs::remove_file(&path).await;
            }
            return Err(write_err(source));
        }

        tracing::debug!("Stored {} bytes at {:?}", content.len(), path);
        Ok(())
    }

    async fn read(&self, name: &StorageName) -> Result<Bytes, ArtifactError> {
        tokio::fs::read(self.path(name))
            .await
            .map(Bytes::from)
            .map_err(|source| ArtifactError::Read {
                name: name.to_string(),
                source,
            })
    }

    async fn remove(&self, name: &StorageName) -> Result<(), ArtifactError> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Artifact {} already absent", name);
                Ok(())
            }
            Err(source) => Err(ArtifactError::Remove {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn path(&self, name: &StorageName) -> PathBuf {
        self.dir.join(name.as_str())
    }
}
