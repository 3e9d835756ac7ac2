/// Cache-augmented metadata store
///
/// Reads go through a [`RecordCache`] in front of the [`MetadataBackend`];
/// writes go straight to the backend and never populate the cache. A key
/// has no explicit state: whether it is absent, cached and valid, cached
/// but past its record expiry, or only in the backend is worked out from
/// cache presence and `expires_at` at the moment of each access.

use crate::backend::{BackendError, MetadataBackend};
use crate::cache::{CacheLookup, CacheStats, RecordCache};
use crate::types::{now_unix, OwnerToken, Record};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Record store keyed by short code, with a read-through cache
pub struct MetadataStore {
    backend: Arc<dyn MetadataBackend>,
    cache: RecordCache,
}

impl MetadataStore {
    /// The cache is owned by the store; nothing else reads or writes it.
    pub fn new(backend: Arc<dyn MetadataBackend>, cache: RecordCache) -> Self {
        Self { backend, cache }
    }

    /// Inserts `record` only if its code is free.
    ///
    /// Returns [`Error::Conflict`] when the code is taken and
    /// [`Error::Store`] for any other backend failure.
    pub async fn insert_if_absent(&self, record: &Record) -> Result<()> {
        debug!("insert_if_absent code={} kind={:?}", record.code, record.kind);
        match self.backend.put_if_absent(record).await {
            Ok(()) => Ok(()),
            Err(BackendError::ConditionFailed) => Err(Error::Conflict(record.code.clone())),
            Err(e) => {
                warn!("Metadata put failed for {}: {}", record.code, e);
                Err(Error::Store(e.to_string()))
            }
        }
    }

    /// Fetches the live record for `code`.
    ///
    /// A cached entry is served only while its record has not expired.
    /// Misses go to the backend; found records are cached, absent ones
    /// are not.
    pub async fn get(&self, code: &str) -> Result<Option<Record>> {
        self.get_at(code, now_unix()).await
    }

    async fn get_at(&self, code: &str, now: i64) -> Result<Option<Record>> {
        match self.cache.get(code, now) {
            CacheLookup::Hit(record) => {
                debug!("Cache hit for code {}", code);
                return Ok(Some(record));
            }
            CacheLookup::Stale => {
                debug!("Cache hit for code {} but record expired, evicted from cache", code);
            }
            CacheLookup::Miss => {
                debug!("Cache miss for code {}, querying backend", code);
            }
        }

        let record = self
            .backend
            .get(code)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        match record {
            Some(record) if record.is_expired_at(now) => {
                // Expired but not yet collected by the backend
                debug!("Backend returned expired record for code {}", code);
                Ok(None)
            }
            Some(record) => {
                self.cache.insert(&record);
                debug!("Cached record for code {}", code);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Deletes `code` if `owner` owns it.
    ///
    /// A missing record and a record owned by someone else both yield
    /// [`Error::Unauthorized`], so callers cannot probe which codes exist.
    pub async fn delete(&self, code: &str, owner: &OwnerToken) -> Result<()> {
        let authorized = match self.get(code).await? {
            Some(record) => &record.owner == owner,
            None => false,
        };
        if !authorized {
            info!("Delete refused for code {}: unauthorized or not found", code);
            return Err(Error::Unauthorized);
        }

        // The backend re-checks ownership in case the record changed since
        // the read above.
        let result = self.backend.delete_if_owner(code, owner).await;
        self.cache.invalidate(code);

        match result {
            Ok(()) => {
                info!("Deleted code {}", code);
                Ok(())
            }
            Err(BackendError::ConditionFailed) => {
                info!("Delete for code {} lost a race with a concurrent change", code);
                Err(Error::Unauthorized)
            }
            Err(e) => {
                warn!("Database error during delete for code {}: {}", code, e);
                Err(Error::Store(e.to_string()))
            }
        }
    }

    /// Live cache entries, after dropping any past their cache lifetime
    pub fn cache_len(&self) -> usize {
        self.cache.purge_aged();
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
