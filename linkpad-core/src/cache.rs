/// Bounded, time-bounded read cache for metadata records
///
/// Entries leave the cache in four ways: explicit invalidation, LRU
/// eviction by count, the cache's own fixed lifetime, and lazily when a
/// lookup finds the record's `expires_at` already passed. The last two are
/// independent: an entry inside its cache lifetime is still dropped the
/// moment the record it mirrors has expired.

use crate::types::{is_past, OwnerToken, Record, RecordKind};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cached projection of a [`Record`]; the code is the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    pub kind: RecordKind,
    pub value: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub creator_ip: String,
    pub owner: OwnerToken,
}

impl CachedRecord {
    pub fn from_record(record: &Record) -> Self {
        Self {
            kind: record.kind,
            value: record.value.clone(),
            expires_at: record.expires_at,
            created_at: record.created_at,
            creator_ip: record.creator_ip.clone(),
            owner: record.owner.clone(),
        }
    }

    pub fn into_record(self, code: &str) -> Record {
        Record {
            code: code.to_string(),
            kind: self.kind,
            value: self.value,
            expires_at: self.expires_at,
            created_at: self.created_at,
            creator_ip: self.creator_ip,
            owner: self.owner,
        }
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Entry present and the record has not expired
    Hit(Record),
    /// Entry was present but the record had expired; it has been evicted
    Stale,
    /// No usable entry
    Miss,
}

struct Slot {
    entry: CachedRecord,
    inserted: Instant,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_evictions: u64,
    pub lifetime_expiries: u64,
    pub capacity_evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses + self.stale_evictions;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_evictions: AtomicU64,
    lifetime_expiries: AtomicU64,
    capacity_evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            lifetime_expiries: self.lifetime_expiries.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

enum SlotState {
    Missing,
    AgedOut,
    Stale,
}

/// LRU record cache with a fixed per-entry lifetime.
///
/// All access goes through one mutex, so a reader always sees a whole
/// entry. The lock is never held across an await point.
pub struct RecordCache {
    entries: Mutex<LruCache<String, Slot>>,
    lifetime: Duration,
    counters: CacheCounters,
}

impl RecordCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            lifetime,
            counters: CacheCounters::default(),
        }
    }

    /// Looks up `code`, validating both the cache lifetime and the
    /// record's own expiry against `now` (Unix seconds).
    pub fn get(&self, code: &str, now: i64) -> CacheLookup {
        let mut entries = self.entries.lock();

        let state = match entries.get(code) {
            None => SlotState::Missing,
            Some(slot) if slot.inserted.elapsed() >= self.lifetime => SlotState::AgedOut,
            Some(slot) if is_past(slot.entry.expires_at, now) => SlotState::Stale,
            Some(slot) => {
                CacheCounters::bump(&self.counters.hits);
                return CacheLookup::Hit(slot.entry.clone().into_record(code));
            }
        };

        match state {
            SlotState::Missing => {
                CacheCounters::bump(&self.counters.misses);
                CacheLookup::Miss
            }
            SlotState::AgedOut => {
                entries.pop(code);
                CacheCounters::bump(&self.counters.lifetime_expiries);
                CacheCounters::bump(&self.counters.misses);
                CacheLookup::Miss
            }
            SlotState::Stale => {
                entries.pop(code);
                CacheCounters::bump(&self.counters.stale_evictions);
                CacheLookup::Stale
            }
        }
    }

    /// Caches `record`, replacing any entry under the same code and
    /// restarting its lifetime.
    pub fn insert(&self, record: &Record) {
        let slot = Slot {
            entry: CachedRecord::from_record(record),
            inserted: Instant::now(),
        };

        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(record.code.clone(), slot) {
            if evicted != record.code {
                CacheCounters::bump(&self.counters.capacity_evictions);
            }
        }
    }

    /// Drops the entry for `code`. Returns whether one was present.
    pub fn invalidate(&self, code: &str) -> bool {
        let removed = self.entries.lock().pop(code).is_some();
        if removed {
            CacheCounters::bump(&self.counters.invalidations);
        }
        removed
    }

    /// Removes every entry past its cache lifetime and returns how many.
    pub fn purge_aged(&self) -> usize {
        let mut entries = self.entries.lock();
        let aged: Vec<String> = entries
            .iter()
            .filter(|(_, slot)| slot.inserted.elapsed() >= self.lifetime)
            .map(|(code, _)| code.clone())
            .collect();

        for code in &aged {
            entries.pop(code);
        }
        self.counters
            .lifetime_expiries
            .fetch_add(aged.len() as u64, Ordering::Relaxed);
        aged.len()
    }

    /// Number of resident entries, including ones not yet found aged out
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}
