//! Algorithm-qualified content digests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// An algorithm-qualified content hash of the form `<algorithm>:<hex>`.
///
/// Digests arrive from request paths and stored records, so the type holds
/// the raw string and well-formedness is checked explicitly at each cache
/// entry point with [`Digest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap a raw digest string. No validation happens here.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The algorithm part, empty when the separator is missing.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or("")
    }

    /// The hex part, empty when the separator is missing.
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, e)| e).unwrap_or("")
    }

    /// Check well-formedness: a lowercase alphanumeric algorithm and a
    /// lowercase hex encoding, separated by a single colon.
    pub fn validate(&self) -> CacheResult<()> {
        let Some((algorithm, encoded)) = self.0.split_once(':') else {
            return Err(CacheError::InvalidDigest(self.0.clone()));
        };
        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(CacheError::InvalidDigest(self.0.clone()));
        }
        if encoded.is_empty()
            || !encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(CacheError::InvalidDigest(self.0.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(raw: &str) -> Self {
        Digest::new(raw)
    }
}

impl From<String> for Digest {
    fn from(raw: String) -> Self {
        Digest::new(raw)
    }
}
