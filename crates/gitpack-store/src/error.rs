use std::path::PathBuf;
use std::sync::Arc;

use gitpack_delta::DeltaError;
use gitpack_pack::PackError;
use gitpack_types::{ObjectId, ObjectLocation, TypeError};

/// Errors from pack store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The hash is not listed in any index file of the repository.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The caller passed something that is not a 40-character hex hash.
    #[error("invalid object hash {input:?}: {source}")]
    InvalidHash {
        input: String,
        #[source]
        source: TypeError,
    },

    /// The entry's type code is reserved or not resolved by this store.
    #[error("object type {code} at {location} is not resolvable")]
    InvalidObjectType { code: u8, location: ObjectLocation },

    /// A delta base reference cannot be valid for this pack.
    #[error("corrupt pack at {location}: {reason}")]
    CorruptPack {
        location: ObjectLocation,
        reason: String,
    },

    /// Delta resolution recursed past the configured depth limit.
    #[error("delta chain at {location} exceeds {limit} levels")]
    DeltaChainTooDeep {
        location: ObjectLocation,
        limit: usize,
    },

    /// An index file could not be parsed.
    #[error("index {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: PackError,
    },

    /// Header decoding or payload inflation failed.
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// The delta instruction stream could not be applied to its base.
    #[error("delta at {location}: {source}")]
    Delta {
        location: ObjectLocation,
        #[source]
        source: DeltaError,
    },

    /// Opening or reading an index or pack file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A deduplicated initialization failed; every waiter sees the same error.
    #[error("{0}")]
    Shared(Arc<StoreError>),
}

impl StoreError {
    /// Recover the owned error from a shared build result when this caller
    /// holds the last reference.
    pub(crate) fn from_shared(err: Arc<StoreError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(StoreError::Shared)
    }

    /// Returns `true` if this error, or the shared error it wraps, is
    /// [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
