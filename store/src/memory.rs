use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::driver::{LogicalDb, MetadataConnection, MetadataDriver, PayloadDriver};
use crate::error::{StoreError, StoreErrorKind};

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Default)]
struct Inner {
    metadata: RwLock<HashMap<(u8, String), Value>>,
    payloads: RwLock<HashMap<String, Vec<u8>>>,
}

/// Store driver that keeps everything in process memory.
///
/// Implements both the metadata and the payload driver so a single instance
/// can stand in for both physical stores in tests and single-node setups.
/// Clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::new(
        "memory",
        StoreErrorKind::Transport,
        "operation against a key holding the wrong kind of value",
    )
    .key(key)
}

struct MemoryConnection {
    inner: Arc<Inner>,
    db: u8,
}

#[async_trait::async_trait]
impl MetadataDriver for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn lease(&self, db: LogicalDb) -> Result<Box<dyn MetadataConnection>, StoreError> {
        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
            db: db.index(),
        }))
    }
}

#[async_trait::async_trait]
impl MetadataConnection for MemoryConnection {
    async fn hash_get_multi(
        &mut self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let metadata = self.inner.metadata.read().await;
        match metadata.get(&(self.db, key.to_string())) {
            Some(Value::Hash(hash)) => Ok(fields.iter().map(|f| hash.get(*f).cloned()).collect()),
            Some(Value::Set(_)) => Err(wrong_type(key)),
            None => Ok(vec![None; fields.len()]),
        }
    }

    async fn hash_set_multi(
        &mut self,
        key: &str,
        entries: &[(&str, &str)],
    ) -> Result<(), StoreError> {
        let mut metadata = self.inner.metadata.write().await;
        let value = metadata
            .entry((self.db, key.to_string()))
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let Value::Hash(hash) = value else {
            return Err(wrong_type(key));
        };
        for (field, value) in entries {
            hash.insert((*field).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn hash_set_if_absent(
        &mut self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut metadata = self.inner.metadata.write().await;
        let entry = metadata
            .entry((self.db, key.to_string()))
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let Value::Hash(hash) = entry else {
            return Err(wrong_type(key));
        };
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hash_set_multi(key, &[(field, value)]).await
    }

    async fn hash_delete(&mut self, key: &str, fields: &[&str]) -> Result<usize, StoreError> {
        let mut metadata = self.inner.metadata.write().await;
        let Some(value) = metadata.get_mut(&(self.db, key.to_string())) else {
            return Ok(0);
        };
        let Value::Hash(hash) = value else {
            return Err(wrong_type(key));
        };
        let mut removed = 0;
        for field in fields {
            if hash.remove(*field).is_some() {
                removed += 1;
            }
        }
        // The real store drops a hash once its last field is deleted.
        if hash.is_empty() {
            metadata.remove(&(self.db, key.to_string()));
        }
        Ok(removed)
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut metadata = self.inner.metadata.write().await;
        let value = metadata
            .entry((self.db, key.to_string()))
            .or_insert_with(|| Value::Set(HashSet::new()));
        let Value::Set(set) = value else {
            return Err(wrong_type(key));
        };
        set.insert(member.to_string());
        Ok(())
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let metadata = self.inner.metadata.read().await;
        match metadata.get(&(self.db, key.to_string())) {
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(Value::Hash(_)) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl PayloadDriver for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let payloads = self.inner.payloads.read().await;
        Ok(payloads.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        _expiry: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut payloads = self.inner.payloads.write().await;
        payloads.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
