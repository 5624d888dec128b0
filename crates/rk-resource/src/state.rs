//! Process-wide wiring

use std::sync::Arc;

use rk_core::config::ResourceConfig;
use rk_core::{HostRepository, InventoryExporter, StorageError};
use rk_store::{
    FsArtifactStore, SqliteHostRepository, SqlitePackageRepository, Timeouts,
    YamlInventoryExporter,
};
use rk_trust::{HostTrustManager, KeyError, RusshTrustStore, SystemKeys};

use crate::host::{HostLifecycleManager, HostRecords};
use crate::package::PackageLifecycleManager;

/// Accessors and managers built once from configuration
pub struct ResourceState {
    /// Configuration
    pub config: ResourceConfig,
    /// Host records
    pub hosts: Arc<dyn HostRepository>,
    /// Host inventory entries
    pub inventory: Arc<dyn InventoryExporter>,
    /// Package lifecycle
    pub packages: PackageLifecycleManager,
}

impl ResourceState {
    /// Open the database, apply the schema and build the storage accessors
    pub async fn open(config: ResourceConfig) -> Result<Self, StorageError> {
        let pool = rk_store::connect(&config.database).await?;
        rk_store::migrate(&pool).await?;

        let timeouts = Timeouts::from(&config.database);
        let hosts: Arc<dyn HostRepository> =
            Arc::new(SqliteHostRepository::new(pool.clone(), timeouts));
        let inventory: Arc<dyn InventoryExporter> =
            Arc::new(YamlInventoryExporter::new(config.storage.host_vars_dir()));
        let packages = PackageLifecycleManager::new(
            Arc::new(SqlitePackageRepository::new(pool, timeouts)),
            Arc::new(FsArtifactStore::new(config.storage.packages_dir())),
            config.storage.max_upload_size,
        );

        Ok(Self {
            config,
            hosts,
            inventory,
            packages,
        })
    }

    /// Host operations that need no SSH keys
    pub fn host_records(&self) -> HostRecords {
        HostRecords::new(Arc::clone(&self.hosts), Arc::clone(&self.inventory))
    }

    /// Load the system keys and build the host lifecycle manager.
    ///
    /// Fails when no usable public key is configured, so callers can refuse
    /// to start rather than fail on the first host.
    pub fn host_manager(&self) -> Result<HostLifecycleManager<RusshTrustStore>, KeyError> {
        let keys = Arc::new(SystemKeys::load(&self.config.ssh)?);
        let store = RusshTrustStore::new(self.config.ssh.known_hosts_path.clone());
        let trust = HostTrustManager::new(store, keys, self.config.ssh.timeout);

        Ok(HostLifecycleManager::new(
            trust,
            Arc::clone(&self.hosts),
            Arc::clone(&self.inventory),
        ))
    }
}
