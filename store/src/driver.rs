use std::fmt;
use std::time::Duration;

use crate::error::StoreError;

/// Logical databases multiplexed on the standalone store.
///
/// The standalone store has a per-connection "current database". A lease
/// selects its database before any other command runs, so callers never
/// depend on where the previous lease left the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalDb {
    /// Blob descriptor hashes and repository membership sets.
    Blobs = 0,
    /// Standalone-equivalent slot for per-file descriptors.
    Files = 1,
    /// Standalone-equivalent slot for blob reconstruction recipes.
    Recipes = 2,
}

impl LogicalDb {
    /// The database index sent to the store's select command.
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// A connection leased from the metadata store, pinned to one logical
/// database for the duration of the lease.
///
/// Commands issued on a single connection are strictly sequenced by the
/// store. Dropping the connection returns it to the pool.
#[async_trait::async_trait]
pub trait MetadataConnection: Send {
    /// Read several fields of a hash. The reply has one entry per
    /// requested field; absent fields (or an absent key) read as `None`.
    async fn hash_get_multi(
        &mut self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, StoreError>;

    /// Write several fields of a hash, overwriting existing values.
    async fn hash_set_multi(
        &mut self,
        key: &str,
        entries: &[(&str, &str)],
    ) -> Result<(), StoreError>;

    /// Write one field of a hash only if it is not already present.
    /// Returns whether the write happened.
    async fn hash_set_if_absent(
        &mut self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError>;

    /// Write one field of a hash, overwriting any existing value.
    async fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Delete fields from a hash, returning how many were removed.
    async fn hash_delete(&mut self, key: &str, fields: &[&str]) -> Result<usize, StoreError>;

    /// Add a member to a set.
    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Test membership in a set.
    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, StoreError>;
}

/// The standalone metadata store.
#[async_trait::async_trait]
pub trait MetadataDriver: fmt::Debug + Send + Sync {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Lease a connection scoped to the given logical database.
    async fn lease(&self, db: LogicalDb) -> Result<Box<dyn MetadataConnection>, StoreError>;
}

/// The clustered payload store.
///
/// Keys route to shards transparently; values are opaque binary.
#[async_trait::async_trait]
pub trait PayloadDriver: fmt::Debug + Send + Sync {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Read the value under a key, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value under a key, optionally expiring.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Option<Duration>,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(MetadataDriver);
    static_assertions::assert_obj_safe!(MetadataConnection);
    static_assertions::assert_obj_safe!(PayloadDriver);

    #[test]
    fn logical_db_indexes() {
        assert_eq!(LogicalDb::Blobs.index(), 0);
        assert_eq!(LogicalDb::Files.index(), 1);
        assert_eq!(LogicalDb::Recipes.index(), 2);
    }
}
