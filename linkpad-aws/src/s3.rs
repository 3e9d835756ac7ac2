/// S3 blob backend
///
/// Stores already-compressed payload bytes as-is. Compression and key
/// derivation happen in `linkpad_core::PayloadStore`.

use crate::error::classify;
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use bytes::Bytes;
use linkpad_core::{BackendError, BackendResult, BlobBackend};
use std::fmt;
use tracing::debug;

pub struct S3BlobBackend {
    client: Client,
    bucket: String,
}

impl S3BlobBackend {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobBackend for S3BlobBackend {
    async fn put(&self, key: &str, bytes: Bytes) -> BackendResult<()> {
        let len = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into())
            .send()
            .await
            .map_err(|e| classify(&e))?;

        debug!("Put s3://{}/{} ({} bytes)", self.bucket, key, len);
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(&e))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Unavailable(format!("failed to read body of {}: {}", key, e)))?
            .into_bytes();

        debug!("Got s3://{}/{} ({} bytes)", self.bucket, key, data.len());
        Ok(data)
    }
}

/// A missing key is reported as a typed variant rather than an error code.
fn classify_get_error<R: fmt::Debug>(err: &SdkError<GetObjectError, R>) -> BackendError {
    match err.as_service_error() {
        Some(service) if service.is_no_such_key() => BackendError::NotFound,
        _ => classify(err),
    }
}
