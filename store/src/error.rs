use std::error::Error as StdError;
use std::fmt;

/// Categorizes store errors independent of the backing implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// A connection could not be leased from the pool.
    Pool,

    /// A command failed in transit or was refused by the store.
    Transport,

    /// The backend configuration was rejected while building a client.
    Config,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Pool => write!(f, "pool"),
            StoreErrorKind::Transport => write!(f, "transport"),
            StoreErrorKind::Config => write!(f, "config"),
        }
    }
}

/// Error raised by a store backend.
///
/// Carries the backend name, the key the failing command addressed when one
/// is known, and the underlying error as its source.
#[derive(Debug)]
pub struct StoreError {
    kind: StoreErrorKind,
    store: &'static str,
    key: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StoreError {
    /// Create a new store error.
    pub fn new<E>(store: &'static str, kind: StoreErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            store,
            key: None,
            source: error.into(),
        }
    }

    /// Returns a closure that wraps a downstream error, for use with
    /// `map_err`.
    pub fn with<E>(
        store: &'static str,
        kind: StoreErrorKind,
    ) -> impl FnOnce(E) -> StoreError
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        move |error: E| StoreError::new(store, kind, error)
    }

    /// Attach the key the failing command addressed.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The semantic category of this error.
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Name of the backend that produced this error.
    pub fn store(&self) -> &'static str {
        self.store
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error [{}] from {}", self.kind, self.store)?;
        if let Some(key) = &self.key {
            write!(f, " (key: {key})")?;
        }
        write!(f, ": {}", self.source)
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}
