use crate::backend::{BackendError, BlobErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Random source error: {0}")]
    RandomSource(String),

    #[error("Code already taken: {0}")]
    Conflict(String),

    #[error("Could not allocate a code after {attempts} attempts")]
    NamespaceExhausted { attempts: usize },

    #[error("Blob write failed ({kind}): {message}")]
    BlobWrite { kind: BlobErrorKind, message: String },

    #[error("Blob read failed ({kind}): {message}")]
    BlobRead { kind: BlobErrorKind, message: String },

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid code format: {0}")]
    InvalidCode(String),

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Payload too large ({size} bytes, {max} max)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::RandomSource(_) => "RANDOM_SOURCE",
            Error::Conflict(_) => "CONFLICT",
            Error::NamespaceExhausted { .. } => "NAMESPACE_EXHAUSTED",
            Error::BlobWrite { .. } => "BLOB_WRITE",
            Error::BlobRead { .. } => "BLOB_READ",
            Error::BlobNotFound(_) => "BLOB_NOT_FOUND",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Store(_) => "STORE_ERROR",
            Error::InvalidCode(_) => "INVALID_CODE",
            Error::EmptyPayload => "EMPTY_PAYLOAD",
            Error::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Error::Compression(_) => "COMPRESSION_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Returns true if this error is retried by the allocation loop.
    ///
    /// Only key collisions qualify. Every other failure is expected to
    /// persist across attempts and is surfaced to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// HTTP status a front end should answer with for this error.
    ///
    /// Namespace exhaustion uses the non-standard 529 so it reads as a
    /// fault of the service rather than of the request.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NamespaceExhausted { .. } => 529,
            Error::BlobWrite {
                kind: BlobErrorKind::TemporarilyUnavailable,
                ..
            } => 503,
            Error::Unauthorized => 401,
            Error::BlobNotFound(_) => 404,
            Error::InvalidCode(_) | Error::EmptyPayload => 400,
            Error::PayloadTooLarge { .. } => 403,
            Error::RandomSource(_)
            | Error::Conflict(_)
            | Error::BlobWrite { .. }
            | Error::BlobRead { .. }
            | Error::Store(_)
            | Error::Compression(_)
            | Error::InvalidConfig(_)
            | Error::Io(_) => 500,
        }
    }

    /// Short message safe to show to an end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::NamespaceExhausted { .. } => "Could not allocate URL in the target namespace.",
            Error::BlobWrite { kind, .. } => match kind {
                BlobErrorKind::AccessDenied => "storage service access denied",
                BlobErrorKind::TemporarilyUnavailable => "storage service temporarily unavailable",
                BlobErrorKind::Misconfigured => "storage configuration error",
                BlobErrorKind::Other => "failed to store data",
            },
            Error::BlobNotFound(_) => "Content not found or has expired",
            Error::BlobRead { .. } => "Failed to retrieve content",
            Error::Unauthorized => "unauthorized",
            Error::InvalidCode(_) => "Invalid code format",
            Error::EmptyPayload => "data parameter is required",
            Error::PayloadTooLarge { .. } => "Data too long",
            Error::RandomSource(_) => "failed to generate code",
            Error::Conflict(_)
            | Error::Store(_)
            | Error::Compression(_)
            | Error::InvalidConfig(_)
            | Error::Io(_) => "internal error",
        }
    }

    /// Maps a blob backend failure on the write path.
    pub(crate) fn blob_write(err: BackendError) -> Error {
        Error::BlobWrite {
            kind: err.blob_kind(),
            message: err.to_string(),
        }
    }

    /// Maps a blob backend failure on the read path. A missing object is
    /// kept distinct so callers can answer "expired" instead of failing.
    pub(crate) fn blob_read(key: &str, err: BackendError) -> Error {
        match err {
            BackendError::NotFound => Error::BlobNotFound(key.to_string()),
            other => Error::BlobRead {
                kind: other.blob_kind(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(Error::Conflict("abcd".into()).is_retryable());
        assert!(!Error::Store("throttled".into()).is_retryable());
        assert!(!Error::RandomSource("no entropy".into()).is_retryable());
        assert!(!Error::NamespaceExhausted { attempts: 6 }.is_retryable());
        assert!(!Error::Unauthorized.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NamespaceExhausted { attempts: 6 }.status_code(), 529);
        assert_eq!(Error::Unauthorized.status_code(), 401);
        assert_eq!(Error::BlobNotFound("S/abcd.zst".into()).status_code(), 404);
        assert_eq!(
            Error::PayloadTooLarge { size: 3, max: 2 }.status_code(),
            403
        );
        assert_eq!(Error::Store("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_blob_write_classification_drives_status() {
        let unavailable = Error::blob_write(BackendError::Unavailable("SlowDown".into()));
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(
            unavailable.public_message(),
            "storage service temporarily unavailable"
        );

        let denied = Error::blob_write(BackendError::AccessDenied("no".into()));
        assert_eq!(denied.status_code(), 500);
        assert_eq!(denied.public_message(), "storage service access denied");

        let misconfigured = Error::blob_write(BackendError::Misconfigured("bucket".into()));
        assert_eq!(misconfigured.public_message(), "storage configuration error");
    }

    #[test]
    fn test_blob_read_not_found_is_distinct() {
        match Error::blob_read("S/abcd.zst", BackendError::NotFound) {
            Error::BlobNotFound(key) => assert_eq!(key, "S/abcd.zst"),
            other => panic!("Expected BlobNotFound, got {:?}", other),
        }

        match Error::blob_read("S/abcd.zst", BackendError::Other("reset".into())) {
            Error::BlobRead { kind, .. } => assert_eq!(kind, BlobErrorKind::Other),
            other => panic!("Expected BlobRead, got {:?}", other),
        }
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(Error::EmptyPayload.code(), "EMPTY_PAYLOAD");
        assert_eq!(
            Error::NamespaceExhausted { attempts: 6 }.code(),
            "NAMESPACE_EXHAUSTED"
        );
    }
}
