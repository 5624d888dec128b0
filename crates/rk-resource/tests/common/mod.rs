//! Shared fixtures for lifecycle tests
//!
//! Real SQLite and filesystem accessors, a scripted SSH transport, and
//! wrappers that can be switched to fail a single step.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh_keys::key::KeyPair;
use tempfile::TempDir;

use rk_core::config::DatabaseConfig;
use rk_core::{
    ArtifactError, ArtifactStore, Endpoint, Host, HostDraft, HostFilter, HostId, HostPatch,
    HostRepository, InventoryError, InventoryExporter, ListQuery, NewPackage, Package,
    PackageFilter, PackageId, PackagePatch, PackageRepository, Page, RequestContext, StorageError,
    StorageName,
};
use rk_resource::{HostLifecycleManager, PackageLifecycleManager};
use rk_store::{
    FsArtifactStore, SqliteHostRepository, SqlitePackageRepository, SqlitePool, Timeouts,
    YamlInventoryExporter,
};
use rk_trust::{DeployableKey, HostTrustManager, SshAuth, SystemKeys, TransportError, TrustStore};

pub const PASSWORD: &str = "correct horse";

/// What the fake transport saw
#[derive(Debug, Default)]
pub struct TransportLog {
    pub dials: Vec<(Endpoint, &'static str)>,
    pub commands: usize,
    pub closes: usize,
}

#[derive(Default)]
struct TransportInner {
    /// Endpoints whose authorized_keys already holds the system key
    trusted: Mutex<HashSet<Endpoint>>,
    /// Endpoint passwords; unknown endpoints refuse every login
    passwords: Mutex<HashMap<Endpoint, String>>,
    fail_commands: AtomicBool,
    log: Mutex<TransportLog>,
}

/// Scripted SSH transport; running a command marks the endpoint trusted
#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<TransportInner>,
}

impl FakeTransport {
    pub fn add_host(&self, endpoint: &Endpoint, password: &str) {
        self.inner
            .passwords
            .lock()
            .unwrap()
            .insert(endpoint.clone(), password.to_string());
    }

    pub fn is_trusted(&self, endpoint: &Endpoint) -> bool {
        self.inner.trusted.lock().unwrap().contains(endpoint)
    }

    pub fn fail_commands(&self, fail: bool) {
        self.inner.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn dial_methods(&self) -> Vec<&'static str> {
        self.inner.log.lock().unwrap().dials.iter().map(|(_, m)| *m).collect()
    }

    pub fn commands(&self) -> usize {
        self.inner.log.lock().unwrap().commands
    }

    pub fn closes(&self) -> usize {
        self.inner.log.lock().unwrap().closes
    }

    pub fn reset_log(&self) {
        *self.inner.log.lock().unwrap() = TransportLog::default();
    }
}

pub struct FakeSession {
    endpoint: Endpoint,
}

#[async_trait]
impl TrustStore for FakeTransport {
    type Session = FakeSession;

    async fn dial(
        &self,
        endpoint: &Endpoint,
        auth: &SshAuth,
        _timeout: Duration,
    ) -> Result<FakeSession, TransportError> {
        self.inner
            .log
            .lock()
            .unwrap()
            .dials
            .push((endpoint.clone(), auth.method()));

        let accepted = match auth {
            SshAuth::PublicKey(_) => self.is_trusted(endpoint),
            SshAuth::Password(p) => {
                self.inner.passwords.lock().unwrap().get(endpoint) == Some(p)
            }
        };
        if accepted {
            Ok(FakeSession {
                endpoint: endpoint.clone(),
            })
        } else {
            Err(TransportError::AuthRejected)
        }
    }

    async fn run(
        &self,
        session: &mut FakeSession,
        _command: &str,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.inner.log.lock().unwrap().commands += 1;
        if self.inner.fail_commands.load(Ordering::SeqCst) {
            return Err(TransportError::CommandFailed {
                exit_status: 1,
                stderr: "permission denied".into(),
            });
        }
        self.inner
            .trusted
            .lock()
            .unwrap()
            .insert(session.endpoint.clone());
        Ok(())
    }

    async fn close(&self, _session: FakeSession) {
        self.inner.log.lock().unwrap().closes += 1;
    }
}

/// Host repository that can be told to fail deletes, or to cancel the
/// request from inside a step
pub struct FlakyHosts {
    inner: SqliteHostRepository,
    pub fail_delete: AtomicBool,
    /// Cancel the request as the insert starts
    pub cancel_on_create: AtomicBool,
    /// Cancel the request once the row is deleted
    pub cancel_after_delete: AtomicBool,
}

#[async_trait]
impl HostRepository for FlakyHosts {
    async fn create(&self, ctx: &RequestContext, draft: &HostDraft) -> Result<Host, StorageError> {
        if self.cancel_on_create.load(Ordering::SeqCst) {
            ctx.cancel();
        }
        self.inner.create(ctx, draft).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: HostId,
        patch: &HostPatch,
    ) -> Result<(), StorageError> {
        self.inner.update(ctx, id, patch).await
    }

    async fn delete(&self, ctx: &RequestContext, id: HostId) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("database is locked".into()));
        }
        self.inner.delete(ctx, id).await?;
        if self.cancel_after_delete.load(Ordering::SeqCst) {
            ctx.cancel();
        }
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, id: HostId) -> Result<Host, StorageError> {
        self.inner.get(ctx, id).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &HostFilter,
        query: &ListQuery,
    ) -> Result<Page<Host>, StorageError> {
        self.inner.list(ctx, filter, query).await
    }
}

/// Inventory exporter that can be told to fail exports or removals
pub struct FlakyInventory {
    inner: YamlInventoryExporter,
    pub fail_export: AtomicBool,
    pub fail_remove: AtomicBool,
}

#[async_trait]
impl InventoryExporter for FlakyInventory {
    async fn export(&self, host: &Host) -> Result<PathBuf, InventoryError> {
        if self.fail_export.load(Ordering::SeqCst) {
            return Err(InventoryError::Serialize("disk quota exceeded".into()));
        }
        self.inner.export(host).await
    }

    async fn remove(&self, id: HostId) -> Result<(), InventoryError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(InventoryError::Io {
                path: self.inner.path(id),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.remove(id).await
    }

    fn path(&self, id: HostId) -> PathBuf {
        self.inner.path(id)
    }
}

/// Package repository that can be told to fail inserts, or to cancel the
/// request from inside a step
pub struct FlakyPackages {
    inner: SqlitePackageRepository,
    pub fail_create: AtomicBool,
    /// Cancel the request as the insert starts
    pub cancel_on_create: AtomicBool,
    /// Cancel the request once the row is deleted
    pub cancel_after_delete: AtomicBool,
}

#[async_trait]
impl PackageRepository for FlakyPackages {
    async fn create(
        &self,
        ctx: &RequestContext,
        package: &NewPackage,
    ) -> Result<Package, StorageError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk I/O error".into()));
        }
        if self.cancel_on_create.load(Ordering::SeqCst) {
            ctx.cancel();
        }
        self.inner.create(ctx, package).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: PackageId,
        patch: &PackagePatch,
    ) -> Result<(), StorageError> {
        self.inner.update(ctx, id, patch).await
    }

    async fn delete(&self, ctx: &RequestContext, id: PackageId) -> Result<(), StorageError> {
        self.inner.delete(ctx, id).await?;
        if self.cancel_after_delete.load(Ordering::SeqCst) {
            ctx.cancel();
        }
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, id: PackageId) -> Result<Package, StorageError> {
        self.inner.get(ctx, id).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &PackageFilter,
        query: &ListQuery,
    ) -> Result<Page<Package>, StorageError> {
        self.inner.list(ctx, filter, query).await
    }
}

/// Artifact store that can be told to fail removals; counts removal calls
pub struct FlakyArtifacts {
    inner: FsArtifactStore,
    pub fail_remove: AtomicBool,
    pub removes: AtomicUsize,
}

#[async_trait]
impl ArtifactStore for FlakyArtifacts {
    async fn write(&self, name: &StorageName, content: &[u8]) -> Result<(), ArtifactError> {
        self.inner.write(name, content).await
    }

    async fn read(&self, name: &StorageName) -> Result<Bytes, ArtifactError> {
        self.inner.read(name).await
    }

    async fn remove(&self, name: &StorageName) -> Result<(), ArtifactError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(ArtifactError::Remove {
                name: name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.remove(name).await
    }

    fn path(&self, name: &StorageName) -> PathBuf {
        self.inner.path(name)
    }
}

async fn pool() -> SqlitePool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".into(),
        ..DatabaseConfig::default()
    };
    let pool = rk_store::connect(&config).await.unwrap();
    rk_store::migrate(&pool).await.unwrap();
    pool
}

pub fn system_keys(count: usize) -> Arc<SystemKeys> {
    let public = (0..count)
        .map(|i| {
            let pair = KeyPair::generate_ed25519().unwrap();
            DeployableKey::from_public_key(&pair.clone_public_key().unwrap(), Some(&format!("rk-{i}")))
        })
        .collect();
    let signer = KeyPair::generate_ed25519().unwrap();
    Arc::new(SystemKeys::new(signer, public).unwrap())
}

pub fn draft(name: &str, address: &str) -> HostDraft {
    HostDraft {
        name: name.into(),
        label: "db".into(),
        address: address.into(),
        port: 22,
        username: "admin".into(),
        interpreter: Some("/usr/bin/python3".into()),
        remark: "primary".into(),
    }
}

/// A host manager over real SQLite and a temp `host_vars` dir
pub struct HostFixture {
    pub dir: TempDir,
    pub transport: FakeTransport,
    pub hosts: Arc<FlakyHosts>,
    pub inventory: Arc<FlakyInventory>,
    pub manager: HostLifecycleManager<FakeTransport>,
}

impl HostFixture {
    pub async fn new() -> Self {
        Self::with_keys(1).await
    }

    pub async fn with_keys(count: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport::default();
        let hosts = Arc::new(FlakyHosts {
            inner: SqliteHostRepository::new(pool().await, Timeouts::default()),
            fail_delete: AtomicBool::new(false),
            cancel_on_create: AtomicBool::new(false),
            cancel_after_delete: AtomicBool::new(false),
        });
        let inventory = Arc::new(FlakyInventory {
            inner: YamlInventoryExporter::new(dir.path().join("host_vars")),
            fail_export: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        });
        let trust = HostTrustManager::new(
            transport.clone(),
            system_keys(count),
            Duration::from_secs(5),
        );
        let manager = HostLifecycleManager::new(
            trust,
            Arc::clone(&hosts) as Arc<dyn HostRepository>,
            Arc::clone(&inventory) as Arc<dyn InventoryExporter>,
        );

        Self {
            dir,
            transport,
            hosts,
            inventory,
            manager,
        }
    }

    pub async fn count(&self) -> u64 {
        self.hosts
            .list(&RequestContext::new(), &HostFilter::default(), &ListQuery::default())
            .await
            .unwrap()
            .total
    }
}

/// A package manager over real SQLite and a temp packages dir
pub struct PackageFixture {
    pub dir: TempDir,
    pub packages: Arc<FlakyPackages>,
    pub artifacts: Arc<FlakyArtifacts>,
    pub manager: PackageLifecycleManager,
}

impl PackageFixture {
    pub async fn new() -> Self {
        Self::with_limit(1024 * 1024).await
    }

    pub async fn with_limit(max_upload_size: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let packages = Arc::new(FlakyPackages {
            inner: SqlitePackageRepository::new(pool().await, Timeouts::default()),
            fail_create: AtomicBool::new(false),
            cancel_on_create: AtomicBool::new(false),
            cancel_after_delete: AtomicBool::new(false),
        });
        let artifacts = Arc::new(FlakyArtifacts {
            inner: FsArtifactStore::new(dir.path().join("packages")),
            fail_remove: AtomicBool::new(false),
            removes: AtomicUsize::new(0),
        });
        let manager = PackageLifecycleManager::new(
            Arc::clone(&packages) as Arc<dyn PackageRepository>,
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            max_upload_size,
        );

        Self {
            dir,
            packages,
            artifacts,
            manager,
        }
    }

    /// Records currently in the database
    pub async fn count(&self) -> u64 {
        self.packages
            .list(&RequestContext::new(), &PackageFilter::default(), &ListQuery::default())
            .await
            .unwrap()
            .total
    }

    /// Files currently in the packages directory
    pub fn stored_files(&self) -> usize {
        match std::fs::read_dir(self.dir.path().join("packages")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}
