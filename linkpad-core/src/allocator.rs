/// Allocation of new records under fresh short codes
///
/// Each attempt draws a candidate code, uploads the blob payload under the
/// candidate's key when the payload is too big to inline, and then tries a
/// conditional insert of the metadata record. Collisions move on to the
/// next attempt; rounds escalate the code length because collisions get
/// likelier as the namespace fills. Any other failure ends the operation.

use crate::codegen::{CodeGenerator, MAX_CODE_LEN};
use crate::config::StoreConfig;
use crate::metadata::MetadataStore;
use crate::payload::{blob_key, CompressedPayload, Placement, PayloadStore};
use crate::types::{now_unix, Lifetime, OwnerToken, Record, RecordKind};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Code lengths tried per round and attempts made in each round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub code_lengths: Vec<usize>,
    pub attempts_per_round: usize,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            code_lengths: vec![4, 5],
            attempts_per_round: 3,
        }
    }
}

impl AllocationPolicy {
    pub fn new(code_lengths: Vec<usize>, attempts_per_round: usize) -> Self {
        Self {
            code_lengths,
            attempts_per_round,
        }
    }

    /// Two rounds starting at the lifetime's preferred length
    pub fn for_lifetime(lifetime: Lifetime) -> Self {
        let first = lifetime.code_length();
        Self {
            code_lengths: vec![first, (first + 1).min(MAX_CODE_LEN)],
            ..Self::default()
        }
    }

    /// Upper bound on insert attempts across all rounds
    pub fn max_attempts(&self) -> usize {
        self.code_lengths.len() * self.attempts_per_round
    }
}

/// What a new record should hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Destination URL of a redirect
    Url(String),
    /// Text paste, placed inline or in the blob store by size
    Text(String),
}

impl Content {
    pub fn len(&self) -> usize {
        match self {
            Content::Url(s) | Content::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request to create a record
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub content: Content,
    pub creator_ip: String,
    pub owner: OwnerToken,
    /// Absolute expiry; `None` applies the configured default TTL
    pub expires_at: Option<i64>,
}

impl NewRecord {
    pub fn redirect(url: impl Into<String>, creator_ip: impl Into<String>, owner: OwnerToken) -> Self {
        Self {
            content: Content::Url(url.into()),
            creator_ip: creator_ip.into(),
            owner,
            expires_at: None,
        }
    }

    pub fn data(text: impl Into<String>, creator_ip: impl Into<String>, owner: OwnerToken) -> Self {
        Self {
            content: Content::Text(text.into()),
            creator_ip: creator_ip.into(),
            owner,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_lifetime(self, lifetime: Lifetime) -> Self {
        let at = lifetime.expires_at(chrono::Utc::now());
        self.with_expiry(at)
    }
}

/// Payload after placement has been decided
struct Prepared {
    kind: RecordKind,
    value: String,
    blob: Option<CompressedPayload>,
}

/// Creates records under unique codes with bounded retry
pub struct Allocator {
    metadata: Arc<MetadataStore>,
    payloads: Arc<PayloadStore>,
    codes: CodeGenerator,
    policy: AllocationPolicy,
    inline_cutoff: usize,
    max_payload: usize,
    default_ttl: Duration,
}

impl Allocator {
    pub fn new(
        metadata: Arc<MetadataStore>,
        payloads: Arc<PayloadStore>,
        codes: CodeGenerator,
        policy: AllocationPolicy,
        config: &StoreConfig,
    ) -> Self {
        Self {
            metadata,
            payloads,
            codes,
            policy,
            inline_cutoff: config.inline_cutoff_bytes,
            max_payload: config.max_payload_bytes,
            default_ttl: config.default_ttl,
        }
    }

    /// Creates a record with the default policy.
    pub async fn create(&self, request: NewRecord) -> Result<Record> {
        self.create_with_policy(request, &self.policy).await
    }

    /// Creates a record, trying codes as laid out by `policy`.
    ///
    /// Fails with [`Error::NamespaceExhausted`] when every attempt
    /// collided. Blob write failures and non-collision metadata failures
    /// end the operation at once.
    pub async fn create_with_policy(
        &self,
        request: NewRecord,
        policy: &AllocationPolicy,
    ) -> Result<Record> {
        let prepared = self.prepare(&request.content)?;
        let created_at = now_unix();
        let expires_at = match request.expires_at {
            Some(at) => at,
            None => self.default_expiry(created_at)?,
        };

        let total = policy.max_attempts();
        let mut attempt = 0;

        for &length in &policy.code_lengths {
            for _ in 0..policy.attempts_per_round {
                attempt += 1;
                let code = self.codes.generate_unique(length)?;

                info!(
                    "Attempting to store {:?} - code {} ({} chars), size {} bytes, attempt {}/{}",
                    prepared.kind,
                    code,
                    length,
                    request.content.len(),
                    attempt,
                    total
                );

                // Blob first: metadata must never point at a missing object
                if let Some(blob) = &prepared.blob {
                    self.payloads.put_compressed(&blob_key(&code), blob).await?;
                }

                let record = Record {
                    code,
                    kind: prepared.kind,
                    value: prepared.value.clone(),
                    expires_at: Some(expires_at),
                    created_at,
                    creator_ip: request.creator_ip.clone(),
                    owner: request.owner.clone(),
                };

                match self.metadata.insert_if_absent(&record).await {
                    Ok(()) => {
                        info!("Stored metadata - code {} ({} chars)", record.code, length);
                        return Ok(record);
                    }
                    Err(e) if e.is_retryable() => {
                        debug!("Duplicate key for {}-char code {}, retrying", length, record.code);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        warn!("Could not allocate a code after {} attempts", attempt);
        Err(Error::NamespaceExhausted { attempts: attempt })
    }

    fn default_expiry(&self, created_at: i64) -> Result<i64> {
        i64::try_from(self.default_ttl.as_secs())
            .ok()
            .and_then(|ttl| created_at.checked_add(ttl))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "default_ttl of {} seconds is out of range",
                    self.default_ttl.as_secs()
                ))
            })
    }

    fn prepare(&self, content: &Content) -> Result<Prepared> {
        if content.is_empty() {
            return Err(Error::EmptyPayload);
        }

        match content {
            Content::Url(url) => {
                if url.len() > self.inline_cutoff {
                    return Err(Error::PayloadTooLarge {
                        size: url.len(),
                        max: self.inline_cutoff,
                    });
                }
                Ok(Prepared {
                    kind: RecordKind::Redirect,
                    value: url.clone(),
                    blob: None,
                })
            }
            Content::Text(text) => {
                if text.len() > self.max_payload {
                    return Err(Error::PayloadTooLarge {
                        size: text.len(),
                        max: self.max_payload,
                    });
                }
                match Placement::for_size(text.len(), self.inline_cutoff) {
                    Placement::Inline => Ok(Prepared {
                        kind: RecordKind::InlineData,
                        value: text.clone(),
                        blob: None,
                    }),
                    Placement::Blob => Ok(Prepared {
                        kind: RecordKind::BlobData,
                        value: String::new(),
                        blob: Some(self.payloads.compress(text.as_bytes())?),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordCache;
    use crate::codegen::ReservedCodes;
    use crate::memory::{MemoryBlobBackend, MemoryMetadataBackend};
    use std::collections::HashSet;

    fn setup(config: StoreConfig) -> (Allocator, MemoryMetadataBackend, MemoryBlobBackend) {
        let meta_backend = MemoryMetadataBackend::new();
        let blob_backend = MemoryBlobBackend::new();
        let metadata = Arc::new(MetadataStore::new(
            Arc::new(meta_backend.clone()),
            RecordCache::new(config.cache_capacity, config.cache_lifetime),
        ));
        let payloads = Arc::new(PayloadStore::new(
            Arc::new(blob_backend.clone()),
            config.compression_level,
        ));
        let allocator = Allocator::new(
            metadata,
            payloads,
            CodeGenerator::new(Arc::new(ReservedCodes::empty())),
            AllocationPolicy::default(),
            &config,
        );
        (allocator, meta_backend, blob_backend)
    }

    fn owner() -> OwnerToken {
        OwnerToken::new("owner-token")
    }

    #[test]
    fn test_default_policy() {
        let policy = AllocationPolicy::default();
        assert_eq!(policy.code_lengths, vec![4, 5]);
        assert_eq!(policy.attempts_per_round, 3);
        assert_eq!(policy.max_attempts(), 6);
    }

    #[test]
    fn test_policy_for_lifetime() {
        assert_eq!(AllocationPolicy::for_lifetime(Lifetime::Day).code_lengths, vec![4, 5]);
        assert_eq!(AllocationPolicy::for_lifetime(Lifetime::Week).code_lengths, vec![5, 6]);
        assert_eq!(AllocationPolicy::for_lifetime(Lifetime::Month).code_lengths, vec![6, 6]);
    }

    #[tokio::test]
    async fn test_create_redirect() {
        let (allocator, backend, blobs) = setup(StoreConfig::default());
        let record = allocator
            .create(NewRecord::redirect("https://example.com", "10.0.0.1", owner()))
            .await
            .unwrap();

        assert_eq!(record.kind, RecordKind::Redirect);
        assert_eq!(record.value, "https://example.com");
        assert_eq!(record.code.len(), 4);
        assert_eq!(record.creator_ip, "10.0.0.1");
        assert!(backend.contains(&record.code));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_default_ttl_applied() {
        let config = StoreConfig::default().with_default_ttl(Duration::from_secs(60));
        let (allocator, _, _) = setup(config);
        let record = allocator
            .create(NewRecord::data("hi", "ip", owner()))
            .await
            .unwrap();
        assert_eq!(record.expires_at, Some(record.created_at + 60));

        let explicit = allocator
            .create(NewRecord::data("hi", "ip", owner()).with_expiry(record.created_at + 5))
            .await
            .unwrap();
        assert_eq!(explicit.expires_at, Some(record.created_at + 5));
    }

    #[tokio::test]
    async fn test_out_of_range_default_ttl_is_rejected() {
        for secs in [u64::MAX, i64::MAX as u64] {
            let config = StoreConfig::default().with_default_ttl(Duration::from_secs(secs));
            let (allocator, backend, _) = setup(config);
            let result = allocator.create(NewRecord::data("hi", "ip", owner())).await;
            assert!(matches!(result, Err(Error::InvalidConfig(_))), "{} secs", secs);
            assert!(backend.is_empty());
        }
    }

    #[tokio::test]
    async fn test_tier_routing_at_cutoff() {
        let config = StoreConfig::default().with_inline_cutoff_bytes(32);
        let (allocator, backend, blobs) = setup(config);

        let inline = allocator
            .create(NewRecord::data("x".repeat(32), "ip", owner()))
            .await
            .unwrap();
        assert_eq!(inline.kind, RecordKind::InlineData);
        assert_eq!(inline.value.len(), 32);
        assert!(blobs.is_empty());

        let blob = allocator
            .create(NewRecord::data("x".repeat(33), "ip", owner()))
            .await
            .unwrap();
        assert_eq!(blob.kind, RecordKind::BlobData);
        assert!(blob.value.is_empty());
        assert_eq!(blobs.keys(), vec![blob_key(&blob.code)]);
        assert!(backend.contains(&blob.code));
    }

    #[tokio::test]
    async fn test_payload_limits() {
        let config = StoreConfig::default()
            .with_inline_cutoff_bytes(8)
            .with_max_payload_bytes(16);
        let (allocator, backend, _) = setup(config);

        assert!(matches!(
            allocator.create(NewRecord::data("", "ip", owner())).await,
            Err(Error::EmptyPayload)
        ));
        assert!(matches!(
            allocator.create(NewRecord::data("x".repeat(17), "ip", owner())).await,
            Err(Error::PayloadTooLarge { size: 17, max: 16 })
        ));
        assert!(matches!(
            allocator
                .create(NewRecord::redirect("https://toolong.example", "ip", owner()))
                .await,
            Err(Error::PayloadTooLarge { max: 8, .. })
        ));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_codes_are_unique() {
        let (allocator, backend, _) = setup(StoreConfig::default());
        let mut codes = HashSet::new();
        for i in 0..200 {
            let record = allocator
                .create(NewRecord::data(format!("paste {}", i), "ip", owner()))
                .await
                .unwrap();
            assert!(codes.insert(record.code));
        }
        assert_eq!(backend.len(), 200);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let (allocator, _, _) = setup(StoreConfig::default());
        let record = allocator
            .create_with_policy(
                NewRecord::data("hi", "ip", owner()),
                &AllocationPolicy::for_lifetime(Lifetime::Month),
            )
            .await
            .unwrap();
        assert_eq!(record.code.len(), 6);
    }
}
