//! # Registry descriptor cache
//!
//! Redis-backed cache for a container image registry, maintaining fast
//! lookup of two classes of metadata in front of the authoritative blob
//! store:
//!
//! - **Blob descriptors**: digest, size and media type per blob, globally
//!   and per repository, with repository membership tracking and
//!   per-repository media-type override ([`BlobDescriptorCache`],
//!   [`RepositoryScopedBlobDescriptorCache`]).
//! - **File descriptors and recipes**: deduplication metadata mapping a
//!   digest to the serialized descriptor of a file inside a blob, and to
//!   recipes describing how a blob is reconstructed from files
//!   ([`FileDescriptorCache`]).
//!
//! Blob metadata lives on a standalone store; file and recipe payloads are
//! sharded across a cluster. The cache never retries and never falls back:
//! misses and store failures both propagate, since callers hold the
//! authoritative source.
//!
//! ## Example
//!
//! ```no_run
//! use cache::{BlobDescriptor, BlobDescriptorCache, Digest};
//! use store::MemoryStore;
//!
//! # async fn example() -> Result<(), cache::CacheError> {
//! let cache = BlobDescriptorCache::new(MemoryStore::new().into());
//! let digest = Digest::new("sha256:e3b0c44298fc1c149afbf4c8996fb924");
//! cache
//!     .set_descriptor(
//!         &digest,
//!         &BlobDescriptor {
//!             digest: digest.clone(),
//!             size: 0,
//!             media_type: "application/octet-stream".into(),
//!         },
//!     )
//!     .await?;
//! let scoped = cache.repository_scoped("library/ubuntu")?;
//! # Ok(())
//! # }
//! ```

mod blob;
mod descriptor;
mod digest;
mod error;
mod file;

pub use blob::{BlobDescriptorCache, RepositoryScopedBlobDescriptorCache};
pub use descriptor::{BinaryValue, BlobDescriptor, BlobRecipe, FileDescriptor, RestoreDescriptor};
pub use digest::Digest;
pub use error::{CacheError, CacheResult};
pub use file::FileDescriptorCache;

use serde::Deserialize;
use store::{MetadataConfig, PayloadConfig};

/// Configuration for the descriptor cache and its two backing stores.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// The standalone store holding blob metadata.
    pub standalone: MetadataConfig,

    /// The clustered store holding file descriptors and recipes.
    pub cluster: PayloadConfig,

    /// Identity of the local server, carried by the file cache.
    pub host: String,
}

impl CacheConfig {
    /// Build both caches over the configured stores.
    ///
    /// The blob cache and the file cache share the standalone store
    /// handle.
    pub fn build(self) -> CacheResult<(BlobDescriptorCache, FileDescriptorCache)> {
        let metadata = self.standalone.build()?;
        let payloads = self.cluster.build()?;
        let blobs = BlobDescriptorCache::new(metadata.clone());
        let files = FileDescriptorCache::new(payloads, metadata, self.host);
        Ok((blobs, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builds_memory_caches() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"standalone": "memory", "cluster": "memory", "host": "10.0.0.1"}"#,
        )
        .unwrap();
        let (_blobs, files) = config.build().unwrap();
        assert_eq!(files.host(), "10.0.0.1");
        assert_eq!(files.metadata_store().name(), "memory");
    }
}
