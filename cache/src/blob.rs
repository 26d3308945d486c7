//! Blob descriptor caching against the standalone metadata store.
//!
//! Descriptors are stored in two parts. A membership set per repository
//! gives fast access to what a repository is allowed to see, and a hash
//! keyed by blob digest holds the digest, size and media type. A second,
//! per-repository hash of the descriptor allows the media type to be
//! overridden for a single repository.
//!
//! There is no implied relationship between the membership set and the
//! descriptor hash. A blob may exist in one, both or neither, and readers
//! tolerate every combination: the multi-command writes below are not
//! atomic, so a concurrent reader can observe membership before the
//! descriptor hash lands and must treat the blob as unknown.

use store::{LogicalDb, MetadataConnection, MetadataStore};

use crate::descriptor::BlobDescriptor;
use crate::digest::Digest;
use crate::error::{CacheError, CacheResult};

const FIELD_DIGEST: &str = "digest";
const FIELD_SIZE: &str = "size";
const FIELD_MEDIATYPE: &str = "mediatype";

fn blob_descriptor_key(digest: &Digest) -> String {
    format!("blobs::{digest}")
}

fn repository_blob_key(repo: &str, digest: &Digest) -> String {
    format!("repository::{repo}::blobs::{digest}")
}

fn repository_set_key(repo: &str) -> String {
    format!("repository::{repo}::blobs")
}

fn validate_repository(repo: &str) -> CacheResult<()> {
    if repo.is_empty()
        || repo.contains("..")
        || repo
            .chars()
            .any(|c| c.is_whitespace() || c.is_ascii_uppercase())
    {
        return Err(CacheError::InvalidRepository(repo.to_string()));
    }
    Ok(())
}

/// Global blob descriptor cache over the standalone store's blob database.
///
/// The media type is written insert-if-not-present: the first insertion is
/// taken as the canonical type, and repository scopes are the only
/// sanctioned way to diverge from it.
#[derive(Debug, Clone)]
pub struct BlobDescriptorCache {
    store: MetadataStore,
}

impl BlobDescriptorCache {
    /// Create a cache over the given metadata store.
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    /// Return a view of this cache scoped to `repo`.
    ///
    /// The view shares this cache's connection pool and gates every read
    /// on the repository's membership set.
    pub fn repository_scoped(
        &self,
        repo: &str,
    ) -> CacheResult<RepositoryScopedBlobDescriptorCache> {
        validate_repository(repo)?;
        Ok(RepositoryScopedBlobDescriptorCache {
            repo: repo.to_string(),
            upstream: self.clone(),
        })
    }

    /// Look up the cached descriptor for `digest`.
    pub async fn stat(&self, digest: &Digest) -> CacheResult<BlobDescriptor> {
        digest.validate()?;
        let mut conn = self.store.lease(LogicalDb::Blobs).await?;
        self.stat_on(conn.as_mut(), digest).await
    }

    /// Remove the descriptor fields for `digest`.
    ///
    /// Membership sets are untouched; cleaning those up belongs to higher
    /// layers. Returns `BlobUnknown` when nothing was stored.
    pub async fn clear(&self, digest: &Digest) -> CacheResult<()> {
        digest.validate()?;
        let mut conn = self.store.lease(LogicalDb::Blobs).await?;
        let removed = conn
            .hash_delete(
                &blob_descriptor_key(digest),
                &[FIELD_DIGEST, FIELD_SIZE, FIELD_MEDIATYPE],
            )
            .await?;
        if removed == 0 {
            return Err(CacheError::BlobUnknown(digest.to_string()));
        }
        Ok(())
    }

    /// Store the descriptor for `digest`.
    ///
    /// `digest` and `size` overwrite previous values; the media type is
    /// written only if the hash does not carry one yet.
    pub async fn set_descriptor(&self, digest: &Digest, desc: &BlobDescriptor) -> CacheResult<()> {
        digest.validate()?;
        desc.validate()?;
        let mut conn = self.store.lease(LogicalDb::Blobs).await?;
        self.set_descriptor_on(conn.as_mut(), digest, desc).await
    }

    /// Stat against an already-leased connection, so the repository view
    /// can run its membership check and this read on one lease.
    async fn stat_on(
        &self,
        conn: &mut dyn MetadataConnection,
        digest: &Digest,
    ) -> CacheResult<BlobDescriptor> {
        let key = blob_descriptor_key(digest);
        let mut reply = conn
            .hash_get_multi(&key, &[FIELD_DIGEST, FIELD_SIZE, FIELD_MEDIATYPE])
            .await?
            .into_iter();
        let stored_digest = reply.next().flatten();
        let size = reply.next().flatten();
        let media_type = reply.next().flatten();

        // The size used to live in a "length" field. Records still keyed
        // that way read as a miss here, which migrates them on the next
        // write-through.
        let (Some(stored_digest), Some(size)) = (stored_digest, size) else {
            return Err(CacheError::BlobUnknown(digest.to_string()));
        };
        let size = size.parse::<i64>().map_err(|err| {
            CacheError::Serialization(format!("size field of {key}: {err}"))
        })?;

        Ok(BlobDescriptor {
            digest: Digest::new(stored_digest),
            size,
            media_type: media_type.unwrap_or_default(),
        })
    }

    async fn set_descriptor_on(
        &self,
        conn: &mut dyn MetadataConnection,
        digest: &Digest,
        desc: &BlobDescriptor,
    ) -> CacheResult<()> {
        let key = blob_descriptor_key(digest);
        let size = desc.size.to_string();
        conn.hash_set_multi(
            &key,
            &[(FIELD_DIGEST, desc.digest.as_str()), (FIELD_SIZE, &size)],
        )
        .await?;
        conn.hash_set_if_absent(&key, FIELD_MEDIATYPE, &desc.media_type)
            .await?;
        Ok(())
    }
}

/// View over [`BlobDescriptorCache`] scoped to one repository.
///
/// Membership is the gate that distinguishes repository visibility from
/// global cache presence: reads and clears return `BlobUnknown` for
/// digests outside the repository's membership set even when the global
/// hash is populated.
#[derive(Debug, Clone)]
pub struct RepositoryScopedBlobDescriptorCache {
    repo: String,
    upstream: BlobDescriptorCache,
}

impl RepositoryScopedBlobDescriptorCache {
    /// The repository this view is scoped to.
    pub fn repository(&self) -> &str {
        &self.repo
    }

    /// Look up the descriptor for `digest` within this repository.
    ///
    /// Requires membership, then forwards to the global cache. If the
    /// repository carries a media-type override, it replaces the global
    /// media type in the reply.
    pub async fn stat(&self, digest: &Digest) -> CacheResult<BlobDescriptor> {
        digest.validate()?;
        let mut conn = self.upstream.store.lease(LogicalDb::Blobs).await?;

        let member = conn
            .set_contains(&repository_set_key(&self.repo), digest.as_str())
            .await?;
        if !member {
            return Err(CacheError::BlobUnknown(digest.to_string()));
        }

        let mut desc = self.upstream.stat_on(conn.as_mut(), digest).await?;

        let mut reply = conn
            .hash_get_multi(&repository_blob_key(&self.repo, digest), &[FIELD_MEDIATYPE])
            .await?
            .into_iter();
        if let Some(media_type) = reply.next().flatten() {
            if !media_type.is_empty() {
                desc.media_type = media_type;
            }
        }

        Ok(desc)
    }

    /// Remove the global descriptor for `digest`, provided the digest is a
    /// member of this repository. Membership itself is left in place.
    pub async fn clear(&self, digest: &Digest) -> CacheResult<()> {
        digest.validate()?;
        let mut conn = self.upstream.store.lease(LogicalDb::Blobs).await?;
        let member = conn
            .set_contains(&repository_set_key(&self.repo), digest.as_str())
            .await?;
        drop(conn);
        if !member {
            return Err(CacheError::BlobUnknown(digest.to_string()));
        }
        self.upstream.clear(digest).await
    }

    /// Store the descriptor for `digest` within this repository.
    ///
    /// Adds membership, writes the global descriptor, then overrides the
    /// repository media type unconditionally. When the descriptor's own
    /// digest uses a different hash algorithm than `digest`, the same
    /// sequence runs for it too, so probes by either digest hit. A
    /// differing digest with the *same* algorithm is a caller error.
    ///
    /// The sequence spans several commands without a transaction; readers
    /// gate on membership and treat a missing global hash as unknown.
    pub async fn set_descriptor(&self, digest: &Digest, desc: &BlobDescriptor) -> CacheResult<()> {
        digest.validate()?;
        desc.validate()?;

        if digest != &desc.digest && digest.algorithm() == desc.digest.algorithm() {
            return Err(CacheError::AlgorithmMismatch {
                key: digest.to_string(),
                descriptor: desc.digest.to_string(),
            });
        }

        let mut conn = self.upstream.store.lease(LogicalDb::Blobs).await?;
        self.set_descriptor_on(conn.as_mut(), digest, desc).await?;

        if digest != &desc.digest {
            self.set_descriptor_on(conn.as_mut(), &desc.digest, desc)
                .await?;
        }
        Ok(())
    }

    async fn set_descriptor_on(
        &self,
        conn: &mut dyn MetadataConnection,
        digest: &Digest,
        desc: &BlobDescriptor,
    ) -> CacheResult<()> {
        conn.set_add(&repository_set_key(&self.repo), digest.as_str())
            .await?;

        self.upstream.set_descriptor_on(conn, digest, desc).await?;

        // The repository scope always takes the caller's media type, even
        // when the global record already carries one.
        conn.hash_set(
            &repository_blob_key(&self.repo, digest),
            FIELD_MEDIATYPE,
            &desc.media_type,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use store::MemoryStore;

    use super::*;

    fn cache() -> BlobDescriptorCache {
        BlobDescriptorCache::new(MemoryStore::new().into())
    }

    fn descriptor(digest: &str, size: i64, media_type: &str) -> BlobDescriptor {
        BlobDescriptor {
            digest: Digest::new(digest),
            size,
            media_type: media_type.to_string(),
        }
    }

    #[test]
    fn key_patterns() {
        let digest = Digest::new("sha256:abc123");
        assert_eq!(blob_descriptor_key(&digest), "blobs::sha256:abc123");
        assert_eq!(
            repository_blob_key("library/ubuntu", &digest),
            "repository::library/ubuntu::blobs::sha256:abc123"
        );
        assert_eq!(
            repository_set_key("library/ubuntu"),
            "repository::library/ubuntu::blobs"
        );
    }

    #[test]
    fn repository_names() {
        validate_repository("library/ubuntu").unwrap();
        for repo in ["", "a/../b", "has space", "Library/Ubuntu"] {
            assert!(
                matches!(
                    validate_repository(repo),
                    Err(CacheError::InvalidRepository(_))
                ),
                "{repo:?}"
            );
        }
    }

    #[tokio::test]
    async fn stat_of_unknown_blob() {
        let cache = cache();
        let err = cache.stat(&Digest::new("sha256:aa")).await.unwrap_err();
        assert!(matches!(err, CacheError::BlobUnknown(_)));
    }

    #[tokio::test]
    async fn invalid_digest_fails_before_io() {
        let cache = cache();
        let err = cache.stat(&Digest::new("garbage")).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidDigest(_)));
    }

    #[tokio::test]
    async fn media_type_is_sticky_globally() {
        let cache = cache();
        let digest = Digest::new("sha256:aa");
        cache
            .set_descriptor(&digest, &descriptor("sha256:aa", 1, "text/plain"))
            .await
            .unwrap();
        cache
            .set_descriptor(&digest, &descriptor("sha256:aa", 2, "application/json"))
            .await
            .unwrap();

        let desc = cache.stat(&digest).await.unwrap();
        assert_eq!(desc.media_type, "text/plain");
        assert_eq!(desc.size, 2);
    }

    #[tokio::test]
    async fn clear_twice_reports_unknown() {
        let cache = cache();
        let digest = Digest::new("sha256:aa");
        cache
            .set_descriptor(&digest, &descriptor("sha256:aa", 1, "m"))
            .await
            .unwrap();
        cache.clear(&digest).await.unwrap();
        let err = cache.clear(&digest).await.unwrap_err();
        assert!(matches!(err, CacheError::BlobUnknown(_)));
    }

    #[tokio::test]
    async fn negative_size_is_rejected() {
        let cache = cache();
        let digest = Digest::new("sha256:aa");
        let err = cache
            .set_descriptor(&digest, &descriptor("sha256:aa", -3, "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidDescriptor(_)));
    }
}
