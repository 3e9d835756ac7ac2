/// SDK error classification
///
/// Both SDKs report service failures with an error code string in their
/// metadata. Transport failures never reach the service and carry no code.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use linkpad_core::BackendError;
use std::fmt;

/// Classifies any SDK operation error.
pub(crate) fn classify<E, R>(err: &SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            BackendError::Unavailable(message)
        }
        SdkError::ConstructionFailure(_) => BackendError::Misconfigured(message),
        _ => classify_code(err.code(), message),
    }
}

/// Maps a service error code to a [`BackendError`].
pub fn classify_code(code: Option<&str>, message: String) -> BackendError {
    let Some(code) = code else {
        return BackendError::Other(message);
    };

    match code {
        "ConditionalCheckFailedException" => BackendError::ConditionFailed,

        "NoSuchKey" | "NotFound" => BackendError::NotFound,

        "AccessDenied"
        | "AccessDeniedException"
        | "Forbidden"
        | "InvalidAccessKeyId"
        | "SignatureDoesNotMatch"
        | "UnrecognizedClientException"
        | "ExpiredToken"
        | "ExpiredTokenException" => BackendError::AccessDenied(message),

        "ServiceUnavailable"
        | "SlowDown"
        | "RequestTimeout"
        | "InternalError"
        | "InternalServerError"
        | "ThrottlingException"
        | "ProvisionedThroughputExceededException"
        | "RequestLimitExceeded" => BackendError::Unavailable(message),

        "NoSuchBucket"
        | "ResourceNotFoundException"
        | "PermanentRedirect"
        | "AuthorizationHeaderMalformed"
        | "ValidationException" => BackendError::Misconfigured(message),

        _ => BackendError::Other(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use linkpad_core::BlobErrorKind;

    fn kind(code: &str) -> BlobErrorKind {
        classify_code(Some(code), code.to_string()).blob_kind()
    }

    #[test]
    fn test_condition_and_not_found() {
        assert_eq!(
            classify_code(Some("ConditionalCheckFailedException"), String::new()),
            BackendError::ConditionFailed
        );
        assert_eq!(classify_code(Some("NoSuchKey"), String::new()), BackendError::NotFound);
    }

    #[test]
    fn test_blob_kinds() {
        assert_eq!(kind("AccessDenied"), BlobErrorKind::AccessDenied);
        assert_eq!(kind("InvalidAccessKeyId"), BlobErrorKind::AccessDenied);
        assert_eq!(kind("SlowDown"), BlobErrorKind::TemporarilyUnavailable);
        assert_eq!(kind("ServiceUnavailable"), BlobErrorKind::TemporarilyUnavailable);
        assert_eq!(kind("NoSuchBucket"), BlobErrorKind::Misconfigured);
        assert_eq!(kind("SomethingNew"), BlobErrorKind::Other);
    }

    #[test]
    fn test_transport_failures() {
        let timeout: SdkError<GetObjectError, ()> = SdkError::timeout_error("timed out");
        let classified = classify(&timeout);
        assert!(matches!(classified, BackendError::Unavailable(_)));
        assert_eq!(classified.blob_kind(), BlobErrorKind::TemporarilyUnavailable);

        let construction: SdkError<GetObjectError, ()> =
            SdkError::construction_failure("bucket name is empty");
        let classified = classify(&construction);
        assert!(matches!(classified, BackendError::Misconfigured(_)));
        assert_eq!(classified.blob_kind(), BlobErrorKind::Misconfigured);
    }

    #[test]
    fn test_missing_code_is_other() {
        assert_eq!(
            classify_code(None, "connection reset".into()),
            BackendError::Other("connection reset".into())
        );
    }
}
