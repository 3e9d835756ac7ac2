/// In-memory storage backends for testing and local runs
///
/// Provide the same semantics as the production backends (conditional put,
/// owner-conditional delete, missing-object errors) but keep everything in
/// process memory. All data is lost when the backend is dropped.

use crate::backend::{BackendError, BackendResult, BlobBackend, MetadataBackend};
use crate::types::{is_past, OwnerToken, Record};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory metadata backend
#[derive(Clone, Default)]
pub struct MemoryMetadataBackend {
    records: Arc<RwLock<HashMap<String, Record>>>,
}

impl MemoryMetadataBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `record` unconditionally, replacing any existing item
    pub fn put(&self, record: Record) {
        self.records.write().insert(record.code.clone(), record);
    }

    /// Removes the item under `code` without any condition
    pub fn remove(&self, code: &str) -> Option<Record> {
        self.records.write().remove(code)
    }

    /// Drops every record whose expiry has passed at `now`, the way the
    /// backing store's own TTL collection would. Returns how many.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !is_past(record.expires_at, now));
        before - records.len()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.records.read().contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataBackend for MemoryMetadataBackend {
    async fn put_if_absent(&self, record: &Record) -> BackendResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.code) {
            return Err(BackendError::ConditionFailed);
        }
        records.insert(record.code.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, code: &str) -> BackendResult<Option<Record>> {
        Ok(self.records.read().get(code).cloned())
    }

    async fn delete_if_owner(&self, code: &str, owner: &OwnerToken) -> BackendResult<()> {
        let mut records = self.records.write();
        let owned = records
            .get(code)
            .map(|record| &record.owner == owner)
            .unwrap_or(false);
        if !owned {
            return Err(BackendError::ConditionFailed);
        }
        records.remove(code);
        Ok(())
    }
}

/// In-memory blob backend
#[derive(Clone, Default)]
pub struct MemoryBlobBackend {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes under `key`, exactly as written
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.objects.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn put(&self, key: &str, bytes: Bytes) -> BackendResult<()> {
        self.objects.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or(BackendError::NotFound)
    }
}
