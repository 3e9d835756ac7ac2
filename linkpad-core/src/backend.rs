/// Storage backend capabilities
///
/// The metadata store and the payload store talk to their storage through
/// these traits. Production implementations live in `linkpad-aws`; the
/// in-memory ones in [`crate::memory`] back tests and local runs.

use crate::types::{OwnerToken, Record};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Typed failure reported by a storage backend.
///
/// Backends classify their own errors at the boundary so that nothing above
/// them has to interpret error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A conditional write or delete found the item in the wrong state
    #[error("conditional check failed")]
    ConditionFailed,

    /// The addressed item or object does not exist
    #[error("not found")]
    NotFound,

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Throttling, timeouts, and service outages
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Missing bucket or table, bad region, and similar setup mistakes
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Collapses this error into the classification used for blob failures.
    pub fn blob_kind(&self) -> BlobErrorKind {
        match self {
            BackendError::AccessDenied(_) => BlobErrorKind::AccessDenied,
            BackendError::Unavailable(_) => BlobErrorKind::TemporarilyUnavailable,
            BackendError::Misconfigured(_) => BlobErrorKind::Misconfigured,
            BackendError::ConditionFailed | BackendError::NotFound | BackendError::Other(_) => {
                BlobErrorKind::Other
            }
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Caller-facing classification of a blob store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobErrorKind {
    AccessDenied,
    TemporarilyUnavailable,
    Misconfigured,
    Other,
}

impl fmt::Display for BlobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlobErrorKind::AccessDenied => "access denied",
            BlobErrorKind::TemporarilyUnavailable => "temporarily unavailable",
            BlobErrorKind::Misconfigured => "misconfigured",
            BlobErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Durable key-value store of code -> record.
///
/// The store is assumed to expire records on its own, no earlier than
/// their `expires_at`.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Writes `record` only if no item exists under its code.
    ///
    /// Must return [`BackendError::ConditionFailed`] when the code is taken.
    async fn put_if_absent(&self, record: &Record) -> BackendResult<()>;

    /// Reads the record stored under `code`, if any.
    async fn get(&self, code: &str) -> BackendResult<Option<Record>>;

    /// Deletes the record under `code` only if its owner token equals `owner`.
    ///
    /// Must return [`BackendError::ConditionFailed`] when the item is missing
    /// or owned by someone else.
    async fn delete_if_owner(&self, code: &str, owner: &OwnerToken) -> BackendResult<()>;
}

/// Byte object store addressed by string keys.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> BackendResult<()>;

    /// Returns [`BackendError::NotFound`] when no object exists under `key`.
    async fn get(&self, key: &str) -> BackendResult<Bytes>;
}
