/// Storage facade
///
/// `Linkpad` wires the code generator, the metadata store, the payload
/// store and the allocator together from one [`StoreConfig`] and a pair of
/// backends. Request handlers talk to this type only.

use crate::allocator::{AllocationPolicy, Allocator, NewRecord};
use crate::backend::{BlobBackend, MetadataBackend};
use crate::cache::{CacheStats, RecordCache};
use crate::codegen::{is_valid_code, CodeGenerator, ReservedCodes};
use crate::config::StoreConfig;
use crate::memory::{MemoryBlobBackend, MemoryMetadataBackend};
use crate::metadata::MetadataStore;
use crate::payload::{blob_key, PayloadStore};
use crate::types::{Lifetime, OwnerToken, Record, RecordKind};
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Linkpad {
    config: StoreConfig,
    metadata: Arc<MetadataStore>,
    payloads: Arc<PayloadStore>,
    allocator: Allocator,
    reserved: Arc<ReservedCodes>,
}

impl Linkpad {
    /// Builds the storage stack over the given backends.
    pub fn new(
        config: StoreConfig,
        metadata_backend: Arc<dyn MetadataBackend>,
        blob_backend: Arc<dyn BlobBackend>,
        reserved: Arc<ReservedCodes>,
    ) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;

        let cache = RecordCache::new(config.cache_capacity, config.cache_lifetime);
        let metadata = Arc::new(MetadataStore::new(metadata_backend, cache));
        let payloads = Arc::new(PayloadStore::new(blob_backend, config.compression_level));
        let allocator = Allocator::new(
            Arc::clone(&metadata),
            Arc::clone(&payloads),
            CodeGenerator::new(Arc::clone(&reserved)),
            AllocationPolicy::default(),
            &config,
        );

        info!(
            "Storage ready (inline cutoff {} bytes, cache {} entries for {:?}, {} reserved codes)",
            config.inline_cutoff_bytes,
            config.cache_capacity,
            config.cache_lifetime,
            reserved.len()
        );

        Ok(Self {
            config,
            metadata,
            payloads,
            allocator,
            reserved,
        })
    }

    /// Builds the storage stack over fresh in-memory backends.
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryMetadataBackend::new()),
            Arc::new(MemoryBlobBackend::new()),
            Arc::new(ReservedCodes::empty()),
        )
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Stores a redirect or paste under a newly allocated code.
    pub async fn create_record(&self, request: NewRecord) -> Result<Record> {
        self.allocator.create(request).await
    }

    /// Stores a record that expires after `lifetime`, with codes sized for
    /// that lifetime.
    pub async fn create_record_for(&self, request: NewRecord, lifetime: Lifetime) -> Result<Record> {
        let request = request.with_lifetime(lifetime);
        self.allocator
            .create_with_policy(request, &AllocationPolicy::for_lifetime(lifetime))
            .await
    }

    /// Live record for `code`, or `None` when absent or expired.
    pub async fn fetch_record(&self, code: &str) -> Result<Option<Record>> {
        check_code(code)?;
        self.metadata.get(code).await
    }

    /// Deletes `code` on behalf of `owner`.
    ///
    /// Fails with [`Error::Unauthorized`] for an empty token, a missing
    /// record and a record owned by someone else alike. The blob of a
    /// blob-tier record is left for the bucket's lifecycle rules.
    pub async fn delete_record(&self, code: &str, owner: &OwnerToken) -> Result<()> {
        check_code(code)?;
        if owner.is_empty() {
            info!("Delete request without owner token for code {}", code);
            return Err(Error::Unauthorized);
        }
        self.metadata.delete(code, owner).await
    }

    /// Decompressed blob payload stored for `code`.
    pub async fn fetch_blob(&self, code: &str) -> Result<Bytes> {
        check_code(code)?;
        self.payloads.get(&blob_key(code)).await
    }

    /// Payload of `record`, from the record itself or from the blob store.
    pub async fn fetch_content(&self, record: &Record) -> Result<Bytes> {
        match record.kind {
            RecordKind::Redirect | RecordKind::InlineData => {
                Ok(Bytes::from(record.value.clone()))
            }
            RecordKind::BlobData => {
                debug!("Fetching blob content for code {}", record.code);
                self.fetch_blob(&record.code).await
            }
        }
    }

    /// Static page served under a reserved code.
    pub fn reserved_page(&self, code: &str) -> Option<Bytes> {
        self.reserved.content(code)
    }

    pub fn cache_len(&self) -> usize {
        self.metadata.cache_len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.metadata.cache_stats()
    }
}

fn check_code(code: &str) -> Result<()> {
    if is_valid_code(code) {
        Ok(())
    } else {
        Err(Error::InvalidCode(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_unix;

    fn owner() -> OwnerToken {
        OwnerToken::generate().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch_redirect() {
        let svc = Linkpad::in_memory(StoreConfig::default()).unwrap();
        let created = svc
            .create_record(NewRecord::redirect("https://example.com/a", "1.2.3.4", owner()))
            .await
            .unwrap();

        let fetched = svc.fetch_record(&created.code).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            svc.fetch_content(&fetched).await.unwrap(),
            Bytes::from_static(b"https://example.com/a")
        );
    }

    #[tokio::test]
    async fn test_blob_record_content() {
        let config = StoreConfig::default().with_inline_cutoff_bytes(16);
        let svc = Linkpad::in_memory(config).unwrap();
        let text = "large paste ".repeat(100);
        let created = svc
            .create_record(NewRecord::data(text.clone(), "ip", owner()))
            .await
            .unwrap();
        assert_eq!(created.kind, RecordKind::BlobData);

        let fetched = svc.fetch_record(&created.code).await.unwrap().unwrap();
        assert_eq!(svc.fetch_content(&fetched).await.unwrap(), Bytes::from(text.clone()));
        assert_eq!(svc.fetch_blob(&created.code).await.unwrap(), Bytes::from(text));
    }

    #[tokio::test]
    async fn test_invalid_code_rejected() {
        let svc = Linkpad::in_memory(StoreConfig::default()).unwrap();
        for code in ["abc", "abcdefg", "ab-d", "ab/d", ""] {
            assert!(matches!(
                svc.fetch_record(code).await,
                Err(Error::InvalidCode(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_fetch_blob_rejects_malformed_code() {
        let svc = Linkpad::in_memory(StoreConfig::default()).unwrap();
        for code in ["../etc", "ab/cd", "abc", ""] {
            assert!(matches!(
                svc.fetch_blob(code).await,
                Err(Error::InvalidCode(_))
            ));
        }
    }

    #[test]
    fn test_out_of_range_default_ttl_rejected() {
        let config = StoreConfig::default().with_default_ttl(std::time::Duration::from_secs(u64::MAX));
        assert!(matches!(
            Linkpad::in_memory(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let svc = Linkpad::in_memory(StoreConfig::default()).unwrap();
        let token = owner();
        let created = svc
            .create_record(NewRecord::data("hi", "ip", token.clone()))
            .await
            .unwrap();

        assert!(matches!(
            svc.delete_record(&created.code, &OwnerToken::new("")).await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            svc.delete_record(&created.code, &owner()).await,
            Err(Error::Unauthorized)
        ));

        svc.delete_record(&created.code, &token).await.unwrap();
        assert!(svc.fetch_record(&created.code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_for_lifetime() {
        let svc = Linkpad::in_memory(StoreConfig::default()).unwrap();
        let record = svc
            .create_record_for(NewRecord::data("hi", "ip", owner()), Lifetime::Week)
            .await
            .unwrap();
        assert_eq!(record.code.len(), 5);
        let expires = record.expires_at.unwrap();
        let week = 7 * 24 * 3600;
        assert!((expires - now_unix() - week).abs() < 5);
    }

    #[tokio::test]
    async fn test_reserved_pages() {
        let reserved = Arc::new(ReservedCodes::from_pages([("about", "About page")]));
        let svc = Linkpad::new(
            StoreConfig::default(),
            Arc::new(MemoryMetadataBackend::new()),
            Arc::new(MemoryBlobBackend::new()),
            reserved,
        )
        .unwrap();

        assert_eq!(svc.reserved_page("about"), Some(Bytes::from_static(b"About page")));
        assert_eq!(svc.reserved_page("About"), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StoreConfig::default().with_cache_capacity(0);
        assert!(matches!(
            Linkpad::in_memory(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
