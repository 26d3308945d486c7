use std::fmt;
use std::time::Duration;

use deadpool_redis::redis;

use crate::driver::{LogicalDb, MetadataConnection, MetadataDriver, PayloadDriver};
use crate::error::{StoreError, StoreErrorKind};
use crate::PoolSettings;

fn pool_config(settings: &PoolSettings) -> deadpool_redis::PoolConfig {
    // deadpool sizes its idle set from max_size; max_idle stays advisory.
    let mut config = deadpool_redis::PoolConfig::new(settings.max_active);
    if let Some(secs) = settings.idle_timeout {
        config.timeouts.recycle = Some(Duration::from_secs(secs));
    }
    config
}

fn command_error<'a>(store: &'static str, key: &'a str) -> impl FnOnce(redis::RedisError) -> StoreError + 'a {
    move |err| StoreError::new(store, StoreErrorKind::Transport, err).key(key)
}

/// Driver for a standalone Redis instance, behind a connection pool.
///
/// Every lease selects its logical database before any other command, so
/// the pool may hand out connections in any state.
pub struct RedisStandalone {
    pool: deadpool_redis::Pool,
}

impl fmt::Debug for RedisStandalone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStandalone").finish_non_exhaustive()
    }
}

impl RedisStandalone {
    /// Build a pooled client for the instance at `endpoint`
    /// (a `redis://` URL).
    pub fn new(endpoint: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let mut cfg = deadpool_redis::Config::from_url(endpoint);
        cfg.pool = Some(pool_config(&settings));
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(StoreError::with("redis", StoreErrorKind::Config))?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl MetadataDriver for RedisStandalone {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn lease(&self, db: LogicalDb) -> Result<Box<dyn MetadataConnection>, StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(StoreError::with("redis", StoreErrorKind::Pool))?;
        let _: () = redis::cmd("SELECT")
            .arg(db.index())
            .query_async(&mut conn)
            .await
            .map_err(StoreError::with("redis", StoreErrorKind::Transport))?;
        Ok(Box::new(RedisConnection { conn }))
    }
}

struct RedisConnection {
    conn: deadpool_redis::Connection,
}

#[async_trait::async_trait]
impl MetadataConnection for RedisConnection {
    async fn hash_get_multi(
        &mut self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key);
        for field in fields {
            cmd.arg(*field);
        }
        cmd.query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))
    }

    async fn hash_set_multi(
        &mut self,
        key: &str,
        entries: &[(&str, &str)],
    ) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in entries {
            cmd.arg(*field).arg(*value);
        }
        let _: () = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))?;
        Ok(())
    }

    async fn hash_set_if_absent(
        &mut self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        redis::cmd("HSETNX")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))
    }

    async fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: () = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))?;
        Ok(())
    }

    async fn hash_delete(&mut self, key: &str, fields: &[&str]) -> Result<usize, StoreError> {
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(key);
        for field in fields {
            cmd.arg(*field);
        }
        let removed: i64 = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))?;
        Ok(removed as usize)
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), StoreError> {
        let _: () = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))?;
        Ok(())
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn)
            .await
            .map_err(command_error("redis", key))
    }
}

/// Driver for a Redis cluster, behind a connection pool.
///
/// Keys route to their shards inside the client; callers never see the
/// topology.
pub struct RedisCluster {
    pool: deadpool_redis::cluster::Pool,
}

impl fmt::Debug for RedisCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCluster").finish_non_exhaustive()
    }
}

impl RedisCluster {
    /// Build a pooled client for the cluster reachable through `endpoints`.
    pub fn new(endpoints: Vec<String>, settings: PoolSettings) -> Result<Self, StoreError> {
        let mut cfg = deadpool_redis::cluster::Config::default();
        cfg.urls = Some(endpoints);
        cfg.pool = Some(pool_config(&settings));
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(StoreError::with("redis-cluster", StoreErrorKind::Config))?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl PayloadDriver for RedisCluster {
    fn name(&self) -> &'static str {
        "redis-cluster"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(StoreError::with("redis-cluster", StoreErrorKind::Pool))?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error("redis-cluster", key))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(StoreError::with("redis-cluster", StoreErrorKind::Pool))?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(expiry) = expiry {
            cmd.arg("EX").arg(expiry.as_secs());
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(command_error("redis-cluster", key))?;
        Ok(())
    }
}
