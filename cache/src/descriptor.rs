//! Descriptor value types and their stored forms.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{CacheError, CacheResult};

/// Metadata describing one content-addressable blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Canonical digest of the blob content.
    pub digest: Digest,

    /// Content length in bytes.
    pub size: i64,

    /// Media type, possibly empty on first insertion.
    #[serde(rename = "mediatype")]
    pub media_type: String,
}

impl BlobDescriptor {
    /// Check that the descriptor is storable: a well-formed digest and a
    /// non-negative size. The media type may be empty.
    pub fn validate(&self) -> CacheResult<()> {
        if self.digest.validate().is_err() {
            return Err(CacheError::InvalidDescriptor(format!(
                "malformed digest {:?}",
                self.digest.as_str()
            )));
        }
        if self.size < 0 {
            return Err(CacheError::InvalidDescriptor(format!(
                "negative size {} for {}",
                self.size, self.digest
            )));
        }
        Ok(())
    }
}

/// Metadata describing one deduplicated file inside a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Digest of the file content.
    pub digest: Digest,

    /// File length in bytes.
    pub size: i64,

    /// Location of the primary copy on its home server.
    pub path: String,

    /// Server holding the primary copy.
    pub server: String,
}

/// Per-server slice of a restore-time recipe: the files this server is
/// expected to deliver when the blob is reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreDescriptor {
    /// Server the slice is addressed to.
    pub server: String,

    /// Digests of the files to deliver.
    pub files: Vec<Digest>,
}

/// Recipe describing how a blob relates to its deduplicated files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlobRecipe {
    /// The ordered file list a blob is reassembled from.
    #[serde(rename = "build-recipe")]
    Build {
        /// Digests of the member files, in reassembly order.
        files: Vec<Digest>,
    },

    /// Restore-time plan, sliced per server.
    #[serde(rename = "restore-response-recipe")]
    RestoreResponse {
        /// Slice of the plan addressed to each server.
        servers: HashMap<String, RestoreDescriptor>,
    },
}

/// Round-trippable binary form for values held in the payload store.
///
/// The cache never interprets the bytes; it stores and returns them
/// verbatim, so decode(encode(x)) == x is the only contract.
pub trait BinaryValue: Sized {
    /// Encode to the stored byte form.
    fn to_bytes(&self) -> CacheResult<Vec<u8>>;

    /// Decode from the stored byte form.
    fn from_bytes(bytes: &[u8]) -> CacheResult<Self>;
}

impl<T> BinaryValue for T
where
    T: Serialize + DeserializeOwned,
{
    fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(size: i64) -> BlobDescriptor {
        BlobDescriptor {
            digest: Digest::new("sha256:0a1b"),
            size,
            media_type: "application/octet-stream".to_string(),
        }
    }

    #[test]
    fn blob_descriptor_validation() {
        descriptor(0).validate().unwrap();
        descriptor(1024).validate().unwrap();

        let err = descriptor(-1).validate().unwrap_err();
        assert!(matches!(err, CacheError::InvalidDescriptor(_)));

        let mut bad = descriptor(1);
        bad.digest = Digest::new("not a digest");
        assert!(matches!(
            bad.validate().unwrap_err(),
            CacheError::InvalidDescriptor(_)
        ));
    }

    #[test]
    fn file_descriptor_roundtrips() {
        let desc = FileDescriptor {
            digest: Digest::new("sha256:7173b8"),
            size: 512,
            path: "/var/lib/registry/files/71/73b8".to_string(),
            server: "10.0.0.7".to_string(),
        };
        let bytes = desc.to_bytes().unwrap();
        assert_eq!(FileDescriptor::from_bytes(&bytes).unwrap(), desc);
    }

    #[test]
    fn recipe_variants_roundtrip() {
        let build = BlobRecipe::Build {
            files: vec![Digest::new("sha256:aa"), Digest::new("sha256:bb")],
        };
        let bytes = build.to_bytes().unwrap();
        assert_eq!(BlobRecipe::from_bytes(&bytes).unwrap(), build);

        let restore = BlobRecipe::RestoreResponse {
            servers: HashMap::from([(
                "10.0.0.8".to_string(),
                RestoreDescriptor {
                    server: "10.0.0.8".to_string(),
                    files: vec![Digest::new("sha256:cc")],
                },
            )]),
        };
        let bytes = restore.to_bytes().unwrap();
        assert_eq!(BlobRecipe::from_bytes(&bytes).unwrap(), restore);
    }

    #[test]
    fn recipe_tag_values_are_stable() {
        let build = BlobRecipe::Build { files: Vec::new() };
        let json: serde_json::Value =
            serde_json::from_slice(&build.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "build-recipe");

        let restore = BlobRecipe::RestoreResponse {
            servers: HashMap::new(),
        };
        let json: serde_json::Value =
            serde_json::from_slice(&restore.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "restore-response-recipe");
    }
}
