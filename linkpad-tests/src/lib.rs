/// Test utilities and helpers for Linkpad testing
///
/// Scriptable backends that wrap the in-memory ones, plus a harness that
/// wires them into a [`Linkpad`] service.

use async_trait::async_trait;
use bytes::Bytes;
use linkpad_core::memory::{MemoryBlobBackend, MemoryMetadataBackend};
use linkpad_core::{
    BackendError, BackendResult, BlobBackend, Linkpad, MetadataBackend, OwnerToken, Record,
    ReservedCodes, StoreConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Storage call observed by a test backend, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BlobPut(String),
    MetadataPut(String),
}

/// Shared, ordered log of storage calls across backends
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }
}

/// Metadata backend whose conditional puts can be made to collide or fail
pub struct ScriptedMetadataBackend {
    inner: MemoryMetadataBackend,
    conflicts_remaining: AtomicUsize,
    failure: Mutex<Option<BackendError>>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    attempted: Mutex<Vec<String>>,
    log: EventLog,
}

impl ScriptedMetadataBackend {
    /// Behaves exactly like the in-memory backend
    pub fn new() -> Self {
        Self::conflicting(0)
    }

    /// The first `n` puts report a taken code
    pub fn conflicting(n: usize) -> Self {
        Self {
            inner: MemoryMetadataBackend::new(),
            conflicts_remaining: AtomicUsize::new(n),
            failure: Mutex::new(None),
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            attempted: Mutex::new(Vec::new()),
            log: EventLog::new(),
        }
    }

    /// Every put reports a taken code
    pub fn always_conflicting() -> Self {
        Self::conflicting(usize::MAX)
    }

    /// Every put fails with `error`
    pub fn failing(error: BackendError) -> Self {
        let backend = Self::new();
        *backend.failure.lock() = Some(error);
        backend
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    /// Direct access to the stored records
    pub fn inner(&self) -> &MemoryMetadataBackend {
        &self.inner
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Codes passed to `put_if_absent`, in call order
    pub fn attempted_codes(&self) -> Vec<String> {
        self.attempted.lock().clone()
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl Default for ScriptedMetadataBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataBackend for ScriptedMetadataBackend {
    async fn put_if_absent(&self, record: &Record) -> BackendResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.attempted.lock().push(record.code.clone());
        self.log.push(Event::MetadataPut(record.code.clone()));

        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        if self.take_conflict() {
            return Err(BackendError::ConditionFailed);
        }
        self.inner.put_if_absent(record).await
    }

    async fn get(&self, code: &str) -> BackendResult<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(code).await
    }

    async fn delete_if_owner(&self, code: &str, owner: &OwnerToken) -> BackendResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_if_owner(code, owner).await
    }
}

/// Blob backend that records puts and can be made to fail
pub struct RecordingBlobBackend {
    inner: MemoryBlobBackend,
    failure: Option<BackendError>,
    put_calls: AtomicUsize,
    log: EventLog,
}

impl RecordingBlobBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBlobBackend::new(),
            failure: None,
            put_calls: AtomicUsize::new(0),
            log: EventLog::new(),
        }
    }

    /// Every put and get fails with `error`
    pub fn failing(error: BackendError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn inner(&self) -> &MemoryBlobBackend {
        &self.inner
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

impl Default for RecordingBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobBackend for RecordingBlobBackend {
    async fn put(&self, key: &str, bytes: Bytes) -> BackendResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::BlobPut(key.to_string()));
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.inner.get(key).await
    }
}

/// Service wired to scriptable backends that stay reachable for
/// inspection
pub struct TestService {
    pub service: Linkpad,
    pub metadata: Arc<ScriptedMetadataBackend>,
    pub blobs: Arc<RecordingBlobBackend>,
    pub log: EventLog,
}

impl TestService {
    /// Default configuration over well-behaved backends
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::build(
            config,
            ScriptedMetadataBackend::new(),
            RecordingBlobBackend::new(),
            ReservedCodes::empty(),
        )
    }

    pub fn with_metadata(config: StoreConfig, metadata: ScriptedMetadataBackend) -> Self {
        Self::build(config, metadata, RecordingBlobBackend::new(), ReservedCodes::empty())
    }

    pub fn with_blobs(config: StoreConfig, blobs: RecordingBlobBackend) -> Self {
        Self::build(config, ScriptedMetadataBackend::new(), blobs, ReservedCodes::empty())
    }

    pub fn with_reserved(config: StoreConfig, reserved: ReservedCodes) -> Self {
        Self::build(
            config,
            ScriptedMetadataBackend::new(),
            RecordingBlobBackend::new(),
            reserved,
        )
    }

    /// Both backends share one event log
    pub fn build(
        config: StoreConfig,
        metadata: ScriptedMetadataBackend,
        blobs: RecordingBlobBackend,
        reserved: ReservedCodes,
    ) -> Self {
        let log = EventLog::new();
        let metadata = Arc::new(metadata.with_log(log.clone()));
        let blobs = Arc::new(blobs.with_log(log.clone()));
        let service = Linkpad::new(config, metadata.clone(), blobs.clone(), Arc::new(reserved))
            .expect("Failed to build test service");

        Self {
            service,
            metadata,
            blobs,
            log,
        }
    }
}

impl Default for TestService {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh random owner token
pub fn owner() -> OwnerToken {
    OwnerToken::generate().expect("Failed to generate owner token")
}

/// Configuration with a small inline cutoff so blob-tier tests stay cheap
pub fn small_cutoff_config(cutoff: usize) -> StoreConfig {
    StoreConfig::default().with_inline_cutoff_bytes(cutoff)
}
