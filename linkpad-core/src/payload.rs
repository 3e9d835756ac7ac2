/// Tiered payload storage
///
/// Small payloads ride inline in the metadata record; that placement is
/// the caller's job. Payloads above the inline cutoff come here: they are
/// zstd-compressed and written to the blob backend under a key derived
/// from the record's code.

use crate::backend::BlobBackend;
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BLOB_KEY_PREFIX: &str = "S/";
const BLOB_KEY_SUFFIX: &str = ".zst";

/// Where a payload of a given size is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Embedded in the metadata record
    Inline,
    /// Compressed into the blob store
    Blob,
}

impl Placement {
    /// Payloads of exactly `cutoff` bytes stay inline.
    pub fn for_size(len: usize, cutoff: usize) -> Self {
        if len <= cutoff {
            Placement::Inline
        } else {
            Placement::Blob
        }
    }
}

/// Blob store key for the payload of the record with `code`
pub fn blob_key(code: &str) -> String {
    format!("{}{}{}", BLOB_KEY_PREFIX, code, BLOB_KEY_SUFFIX)
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a
/// UTF-8 sequence.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Compressed payload ready to upload.
///
/// Compressing once lets an allocation loop upload the same bytes under
/// several candidate keys.
#[derive(Debug, Clone)]
pub struct CompressedPayload {
    bytes: Bytes,
    original_len: usize,
}

impl CompressedPayload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn original_len(&self) -> usize {
        self.original_len
    }
}

/// Compressing front end to a [`BlobBackend`]
pub struct PayloadStore {
    backend: Arc<dyn BlobBackend>,
    compression_level: i32,
}

impl PayloadStore {
    pub fn new(backend: Arc<dyn BlobBackend>, compression_level: i32) -> Self {
        Self {
            backend,
            compression_level: compression_level.clamp(1, 22),
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<CompressedPayload> {
        let compressed = zstd::stream::encode_all(data, self.compression_level)
            .map_err(|e| Error::Compression(e.to_string()))?;
        Ok(CompressedPayload {
            bytes: Bytes::from(compressed),
            original_len: data.len(),
        })
    }

    /// Compresses `data` and writes it under `key`.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let payload = self.compress(data)?;
        self.put_compressed(key, &payload).await
    }

    /// Writes an already compressed payload under `key`.
    pub async fn put_compressed(&self, key: &str, payload: &CompressedPayload) -> Result<()> {
        if let Err(e) = self.backend.put(key, payload.bytes.clone()).await {
            warn!("Failed to put object {}: {}", key, e);
            return Err(Error::blob_write(e));
        }

        info!(
            "Stored object {} (compressed {} bytes to {} bytes, {:.1}% reduction)",
            key,
            payload.original_len,
            payload.len(),
            reduction(payload.original_len, payload.len())
        );
        Ok(())
    }

    /// Reads and fully decompresses the object under `key`.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let compressed = self.backend.get(key).await.map_err(|e| {
            debug!("Failed to get object {}: {}", key, e);
            Error::blob_read(key, e)
        })?;

        let data = zstd::stream::decode_all(compressed.as_ref()).map_err(|e| {
            warn!("Failed to decompress object {}: {}", key, e);
            Error::Compression(e.to_string())
        })?;

        debug!(
            "Retrieved object {} (decompressed {} bytes to {} bytes)",
            key,
            compressed.len(),
            data.len()
        );
        Ok(Bytes::from(data))
    }
}

fn reduction(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, BlobErrorKind};
    use crate::memory::MemoryBlobBackend;
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn store() -> (PayloadStore, MemoryBlobBackend) {
        let backend = MemoryBlobBackend::new();
        (PayloadStore::new(Arc::new(backend.clone()), 3), backend)
    }

    struct RejectingBackend(BackendError);

    #[async_trait]
    impl BlobBackend for RejectingBackend {
        async fn put(&self, _key: &str, _bytes: Bytes) -> BackendResult<()> {
            Err(self.0.clone())
        }

        async fn get(&self, _key: &str) -> BackendResult<Bytes> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn test_placement_cutoff_is_inclusive() {
        assert_eq!(Placement::for_size(10, 10), Placement::Inline);
        assert_eq!(Placement::for_size(11, 10), Placement::Blob);
        assert_eq!(Placement::for_size(0, 10), Placement::Inline);
    }

    #[test]
    fn test_blob_key_derivation() {
        assert_eq!(blob_key("aB3d"), "S/aB3d.zst");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
        // "é" is two bytes; cutting inside it backs off to the boundary
        assert_eq!(truncate_utf8("aé", 2), "a");
        assert_eq!(truncate_utf8("€", 2), "");
    }

    #[tokio::test]
    async fn test_stored_bytes_are_compressed() {
        let (store, backend) = store();
        let data = vec![b'a'; 64 * 1024];
        store.put("S/abcd.zst", &data).await.unwrap();

        let raw = backend.raw("S/abcd.zst").unwrap();
        assert!(raw.len() < data.len() / 10);
        // zstd frame magic
        assert_eq!(&raw[..4], &[0x28, 0xb5, 0x2f, 0xfd]);
        assert_eq!(store.get("S/abcd.zst").await.unwrap(), Bytes::from(data));
    }

    #[tokio::test]
    async fn test_empty_round_trip() {
        let (store, _) = store();
        store.put("S/empty.zst", b"").await.unwrap();
        assert!(store.get("S/empty.zst").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (store, _) = store();
        assert!(matches!(
            store.get("S/none.zst").await,
            Err(Error::BlobNotFound(key)) if key == "S/none.zst"
        ));
    }

    #[tokio::test]
    async fn test_corrupt_object_is_compression_error() {
        let (store, backend) = store();
        backend
            .put("S/junk.zst", Bytes::from_static(b"not zstd at all"))
            .await
            .unwrap();
        assert!(matches!(store.get("S/junk.zst").await, Err(Error::Compression(_))));
    }

    #[tokio::test]
    async fn test_write_errors_are_classified() {
        let store = PayloadStore::new(
            Arc::new(RejectingBackend(BackendError::Unavailable("SlowDown".into()))),
            3,
        );
        match store.put("S/abcd.zst", b"data").await {
            Err(Error::BlobWrite { kind, .. }) => {
                assert_eq!(kind, BlobErrorKind::TemporarilyUnavailable)
            }
            other => panic!("Expected BlobWrite, got {:?}", other),
        }

        match store.get("S/abcd.zst").await {
            Err(Error::BlobRead { kind, .. }) => {
                assert_eq!(kind, BlobErrorKind::TemporarilyUnavailable)
            }
            other => panic!("Expected BlobRead, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compress_once_put_many() {
        let (store, backend) = store();
        let payload = store.compress(b"shared payload").unwrap();
        assert_eq!(payload.original_len(), 14);

        store.put_compressed("S/aaaa.zst", &payload).await.unwrap();
        store.put_compressed("S/bbbb.zst", &payload).await.unwrap();
        assert_eq!(backend.len(), 2);
        assert_eq!(
            store.get("S/bbbb.zst").await.unwrap(),
            Bytes::from_static(b"shared payload")
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (store, _) = store();
            let got = rt.block_on(async {
                store.put("S/prop.zst", &data).await.unwrap();
                store.get("S/prop.zst").await.unwrap()
            });
            prop_assert_eq!(got.as_ref(), data.as_slice());
        }
    }
}
