//! # Backing stores for the descriptor cache
//!
//! Configuration and unification for the two physical stores: the
//! standalone metadata store (hashes and membership sets, multiplexed over
//! logical databases) and the clustered payload store (opaque binary
//! values, key-routed).
//!
//! Backends implement the driver traits in this crate and are held behind
//! the cheap-to-clone [`MetadataStore`] and [`PayloadStore`] handles.

mod driver;
mod error;
pub(crate) mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

pub use driver::{LogicalDb, MetadataConnection, MetadataDriver, PayloadDriver};
pub use error::{StoreError, StoreErrorKind};

#[doc(inline)]
pub use memory::MemoryStore;
pub use redis::{RedisCluster, RedisStandalone};

/// Pool sizing for the store clients.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolSettings {
    /// Upper bound on concurrently leased connections.
    pub max_active: usize,

    /// Idle connections worth retaining between leases. Advisory for
    /// backends whose pool derives its idle set from `max_active`.
    pub max_idle: usize,

    /// Seconds an idle connection may linger before the pool recycles it.
    pub idle_timeout: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_active: 32,
            max_idle: 8,
            idle_timeout: None,
        }
    }
}

/// Backend selection for the standalone metadata store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataConfig {
    /// In-process store, for tests and single-node development.
    Memory,

    /// A standalone Redis instance.
    Redis {
        /// `redis://` URL of the instance.
        endpoint: String,

        /// Pool sizing.
        #[serde(default)]
        pool: PoolSettings,
    },
}

impl MetadataConfig {
    /// Build the configured store client.
    pub fn build(self) -> Result<MetadataStore, StoreError> {
        Ok(match self {
            MetadataConfig::Memory => MemoryStore::new().into(),
            MetadataConfig::Redis { endpoint, pool } => {
                RedisStandalone::new(&endpoint, pool)?.into()
            }
        })
    }
}

/// Backend selection for the clustered payload store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadConfig {
    /// In-process store, for tests and single-node development.
    Memory,

    /// A Redis cluster.
    RedisCluster {
        /// `redis://` URLs of the cluster nodes.
        endpoints: Vec<String>,

        /// Pool sizing.
        #[serde(default)]
        pool: PoolSettings,
    },
}

impl PayloadConfig {
    /// Build the configured store client.
    pub fn build(self) -> Result<PayloadStore, StoreError> {
        Ok(match self {
            PayloadConfig::Memory => MemoryStore::new().into(),
            PayloadConfig::RedisCluster { endpoints, pool } => {
                RedisCluster::new(endpoints, pool)?.into()
            }
        })
    }
}

/// Handle to the standalone metadata store.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    driver: Arc<dyn MetadataDriver>,
}

impl<D> From<D> for MetadataStore
where
    D: MetadataDriver + 'static,
{
    fn from(value: D) -> Self {
        MetadataStore::new(value)
    }
}

impl MetadataStore {
    /// Wrap a driver in a shared handle.
    pub fn new<D: MetadataDriver + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// Name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Lease a connection scoped to the given logical database.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn lease(&self, db: LogicalDb) -> Result<Box<dyn MetadataConnection>, StoreError> {
        self.driver.lease(db).await
    }
}

/// Handle to the clustered payload store.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    driver: Arc<dyn PayloadDriver>,
}

impl<D> From<D> for PayloadStore
where
    D: PayloadDriver + 'static,
{
    fn from(value: D) -> Self {
        PayloadStore::new(value)
    }
}

impl PayloadStore {
    /// Wrap a driver in a shared handle.
    pub fn new<D: PayloadDriver + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// Name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Read the value under `key`, `None` when the key is absent.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.driver.get(key).await
    }

    /// Write `value` under `key`, optionally expiring.
    #[tracing::instrument(skip(self, value), fields(driver = self.driver.name()))]
    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.driver.set(key, value, expiry).await
    }
}
