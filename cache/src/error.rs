//! Error types for the descriptor cache.

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Error types for cache operations.
///
/// `BlobUnknown` and `NotFound` are the normal miss signals and carry no
/// I/O failure; everything the backing store raises passes through
/// unchanged as `Store`, since the caller usually holds the authoritative
/// source and falls through to it rather than retrying here.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Digest failed well-formedness, before any store I/O.
    #[error("invalid digest: {0:?}")]
    InvalidDigest(String),

    /// Descriptor failed validation, before any store I/O.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Repository name failed validation.
    #[error("invalid repository name: {0:?}")]
    InvalidRepository(String),

    /// A set received a lookup digest and a descriptor digest that differ
    /// while sharing an algorithm.
    #[error("digests differ but algorithm does not: {key} != {descriptor}")]
    AlgorithmMismatch {
        /// The lookup key the caller addressed.
        key: String,
        /// The digest carried inside the descriptor.
        descriptor: String,
    },

    /// The blob is not present, or not visible in this scope.
    #[error("blob unknown to cache: {0}")]
    BlobUnknown(String),

    /// The payload store holds no value under the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] store::StoreError),

    /// A stored value failed to decode, or a value failed to encode.
    #[error("malformed stored value: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
