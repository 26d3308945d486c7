//! File descriptor and recipe caching against the clustered payload store.

use store::{MetadataStore, PayloadStore};

use crate::descriptor::{BinaryValue, BlobRecipe, FileDescriptor};
use crate::digest::Digest;
use crate::error::{CacheError, CacheResult};

fn file_descriptor_key(digest: &Digest) -> String {
    format!("files::{digest}")
}

fn recipe_key(digest: &Digest) -> String {
    format!("Blob:File:Recipe::{digest}")
}

fn restore_recipe_key(digest: &Digest, server: &str) -> String {
    format!("Blob:File:Recipe::RestoreTime::{digest}::{server}")
}

/// Cache for per-file dedup descriptors and blob reconstruction recipes.
///
/// Values are opaque to the cache: descriptors serialize themselves and
/// the stored bytes come back verbatim. File and recipe entries share no
/// invariants with the blob metadata kept on the standalone store.
#[derive(Debug, Clone)]
pub struct FileDescriptorCache {
    payloads: PayloadStore,
    metadata: MetadataStore,
    host: String,
}

impl FileDescriptorCache {
    /// Create a cache over the clustered payload store.
    ///
    /// The standalone metadata store rides along so both stores share a
    /// lifecycle, though file operations route exclusively to the cluster.
    /// `host` identifies this server in restore-time recipes.
    pub fn new(payloads: PayloadStore, metadata: MetadataStore, host: impl Into<String>) -> Self {
        let host = host.into();
        tracing::info!(%host, "file descriptor cache ready");
        Self {
            payloads,
            metadata,
            host,
        }
    }

    /// Identity of the local server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The standalone metadata store held alongside the cluster client.
    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Look up the file descriptor stored for `digest`.
    ///
    /// An absent key surfaces as `NotFound`; store failures and undecodable
    /// values are logged and propagated.
    pub async fn stat_file(&self, digest: &Digest) -> CacheResult<FileDescriptor> {
        digest.validate()?;
        let key = file_descriptor_key(digest);
        let raw = self.fetch(&key, "stat file").await?;
        FileDescriptor::from_bytes(&raw).map_err(|err| {
            tracing::error!(%key, error = %err, "stat file: stored descriptor failed to decode");
            err
        })
    }

    /// Store the file descriptor for `digest`, with no expiration.
    pub async fn set_file_descriptor(
        &self,
        digest: &Digest,
        desc: &FileDescriptor,
    ) -> CacheResult<()> {
        digest.validate()?;
        let key = file_descriptor_key(digest);
        let raw = desc.to_bytes()?;
        if let Err(err) = self.payloads.set(&key, &raw, None).await {
            tracing::error!(%key, error = %err, "set file descriptor: payload store set failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Look up the build recipe stored for `digest`.
    pub async fn stat_blob_recipe(&self, digest: &Digest) -> CacheResult<BlobRecipe> {
        digest.validate()?;
        let key = recipe_key(digest);
        let raw = self.fetch(&key, "stat recipe").await?;
        BlobRecipe::from_bytes(&raw).map_err(|err| {
            tracing::error!(%key, error = %err, "stat recipe: stored recipe failed to decode");
            err
        })
    }

    /// Store a recipe for `digest`.
    ///
    /// A build recipe is stored whole under the recipe key. A
    /// restore-response recipe fans out one entry per addressed server; an
    /// empty plan is a no-op success, and the first failing write aborts
    /// the operation while entries already written stay in place.
    pub async fn set_blob_recipe(&self, digest: &Digest, recipe: &BlobRecipe) -> CacheResult<()> {
        digest.validate()?;
        match recipe {
            BlobRecipe::Build { .. } => {
                let key = recipe_key(digest);
                let raw = recipe.to_bytes()?;
                if let Err(err) = self.payloads.set(&key, &raw, None).await {
                    tracing::error!(%key, error = %err, "set recipe: payload store set failed");
                    return Err(err.into());
                }
            }
            BlobRecipe::RestoreResponse { servers } => {
                for (server, restore) in servers {
                    let key = restore_recipe_key(digest, server);
                    let raw = restore.to_bytes()?;
                    self.payloads.set(&key, &raw, None).await?;
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, key: &str, operation: &'static str) -> CacheResult<Vec<u8>> {
        match self.payloads.get(key).await {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(CacheError::NotFound(key.to_string())),
            Err(err) => {
                tracing::error!(%key, error = %err, "{operation}: payload store get failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use store::{MemoryStore, PayloadStore};

    use super::*;
    use crate::descriptor::RestoreDescriptor;

    fn caches() -> (FileDescriptorCache, PayloadStore) {
        let memory = MemoryStore::new();
        let payloads = PayloadStore::new(memory.clone());
        let cache = FileDescriptorCache::new(
            PayloadStore::new(memory.clone()),
            MetadataStore::new(memory),
            "10.0.0.1",
        );
        (cache, payloads)
    }

    fn file_desc(digest: &str) -> FileDescriptor {
        FileDescriptor {
            digest: Digest::new(digest),
            size: 128,
            path: "/files/aa".to_string(),
            server: "10.0.0.2".to_string(),
        }
    }

    #[test]
    fn key_patterns() {
        let digest = Digest::new("sha256:7173b8");
        assert_eq!(file_descriptor_key(&digest), "files::sha256:7173b8");
        assert_eq!(recipe_key(&digest), "Blob:File:Recipe::sha256:7173b8");
        assert_eq!(
            restore_recipe_key(&digest, "10.0.0.3"),
            "Blob:File:Recipe::RestoreTime::sha256:7173b8::10.0.0.3"
        );
    }

    #[tokio::test]
    async fn file_descriptor_roundtrip() {
        let (cache, _) = caches();
        let digest = Digest::new("sha256:cc");
        let desc = file_desc("sha256:cc");

        cache.set_file_descriptor(&digest, &desc).await.unwrap();
        assert_eq!(cache.stat_file(&digest).await.unwrap(), desc);
    }

    #[tokio::test]
    async fn absent_file_is_not_found() {
        let (cache, _) = caches();
        let err = cache
            .stat_file(&Digest::new("sha256:dd"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }

    #[tokio::test]
    async fn undecodable_value_is_not_a_miss() {
        let (cache, payloads) = caches();
        let digest = Digest::new("sha256:ee");
        payloads
            .set(&file_descriptor_key(&digest), b"not json", None)
            .await
            .unwrap();

        let err = cache.stat_file(&digest).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn build_recipe_roundtrip() {
        let (cache, _) = caches();
        let digest = Digest::new("sha256:ff");
        let recipe = BlobRecipe::Build {
            files: vec![Digest::new("sha256:aa"), Digest::new("sha256:bb")],
        };

        cache.set_blob_recipe(&digest, &recipe).await.unwrap();
        assert_eq!(cache.stat_blob_recipe(&digest).await.unwrap(), recipe);
    }

    #[tokio::test]
    async fn restore_recipe_fans_out_per_server() {
        let (cache, payloads) = caches();
        let digest = Digest::new("sha256:ab");
        let slice = |server: &str| RestoreDescriptor {
            server: server.to_string(),
            files: vec![Digest::new("sha256:01")],
        };
        let recipe = BlobRecipe::RestoreResponse {
            servers: HashMap::from([
                ("10.0.0.4".to_string(), slice("10.0.0.4")),
                ("10.0.0.5".to_string(), slice("10.0.0.5")),
            ]),
        };

        cache.set_blob_recipe(&digest, &recipe).await.unwrap();

        for server in ["10.0.0.4", "10.0.0.5"] {
            let raw = payloads
                .get(&restore_recipe_key(&digest, server))
                .await
                .unwrap()
                .expect("restore entry written");
            assert_eq!(RestoreDescriptor::from_bytes(&raw).unwrap(), slice(server));
        }
        // Nothing lands under the build-recipe key for a restore response.
        assert_eq!(payloads.get(&recipe_key(&digest)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_restore_recipe_is_a_noop() {
        let (cache, _) = caches();
        let recipe = BlobRecipe::RestoreResponse {
            servers: HashMap::new(),
        };
        cache
            .set_blob_recipe(&Digest::new("sha256:09"), &recipe)
            .await
            .unwrap();
    }
}
