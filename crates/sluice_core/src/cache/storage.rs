use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::key::CacheKey;
use crate::config::execution::CacheConfig;
use crate::scalar::ScalarValue;
use crate::statistics::ErrorCode;

/// A row stored in a cache entry, along with any soft errors the wrapped
/// input reported while reading it.
///
/// Replaying a row reports the same errors as the live read did.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRow {
    values: Arc<[ScalarValue]>,
    errors: Arc<[(usize, ErrorCode)]>,
}

impl CachedRow {
    pub fn new(
        values: impl Into<Arc<[ScalarValue]>>,
        errors: impl Into<Arc<[(usize, ErrorCode)]>>,
    ) -> Self {
        CachedRow {
            values: values.into(),
            errors: errors.into(),
        }
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    /// Soft errors by column index.
    pub fn errors(&self) -> &[(usize, ErrorCode)] {
        &self.errors
    }

    /// Read a value the same way the wrapped input returned it.
    pub fn read_value(&self, column_idx: usize) -> Result<ScalarValue, ErrorCode> {
        if let Some((_, code)) = self.errors.iter().find(|(idx, _)| *idx == column_idx) {
            return Err(*code);
        }
        self.values
            .get(column_idx)
            .cloned()
            .ok_or(ErrorCode::InvalidArgument)
    }
}

/// Rows read for one cache key.
///
/// The row buffer only ever grows. A row is appended once all of its values
/// have been read, so readers never see a partial row.
#[derive(Debug)]
pub struct CacheEntry {
    id: Uuid,
    key: CacheKey,
    rows: RwLock<Vec<CachedRow>>,
    max_rows: Option<usize>,
    complete: AtomicBool,
    /// Set once a row had to be dropped because of `max_rows`.
    truncated: AtomicBool,
    refs: AtomicUsize,
    ttl: Duration,
    expires_at: Mutex<Instant>,
}

impl CacheEntry {
    fn new(key: CacheKey, config: &CacheConfig) -> Self {
        CacheEntry {
            id: Uuid::new_v4(),
            key,
            rows: RwLock::new(Vec::new()),
            max_rows: config.max_rows,
            complete: AtomicBool::new(false),
            truncated: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            ttl: config.ttl,
            expires_at: Mutex::new(Instant::now() + config.ttl),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, idx: usize) -> Option<CachedRow> {
        self.rows.read().get(idx).cloned()
    }

    /// Store the row at `idx`.
    ///
    /// Does nothing if another reader already stored it. Rows past the end
    /// of the buffer are ignored, as are rows beyond the entry's bound.
    pub fn append(&self, idx: usize, row: CachedRow) {
        let mut rows = self.rows.write();
        if idx != rows.len() {
            return;
        }
        if self.max_rows.is_some_and(|max| rows.len() >= max) {
            self.truncated.store(true, Ordering::Relaxed);
            return;
        }
        rows.push(row);
    }

    /// Mark the entry as holding every row for its key.
    ///
    /// Ignored for truncated entries.
    pub fn mark_complete(&self) {
        if !self.is_truncated() {
            self.complete.store(true, Ordering::Release);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Relaxed)
    }

    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= *self.expires_at.lock()
    }

    fn touch(&self) {
        *self.expires_at.lock() = Instant::now() + self.ttl;
    }
}

/// A reference to a cache entry. The entry can't be evicted while a handle
/// to it exists.
#[derive(Debug)]
pub struct CacheEntryHandle {
    entry: Arc<CacheEntry>,
}

impl CacheEntryHandle {
    fn new(entry: Arc<CacheEntry>) -> Self {
        entry.refs.fetch_add(1, Ordering::AcqRel);
        CacheEntryHandle { entry }
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }
}

impl Drop for CacheEntryHandle {
    fn drop(&mut self) {
        // TTL counts from the last release.
        self.entry.touch();
        self.entry.refs.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Entry with an equal key.
    Hit,
    /// Complete entry whose key subsumes the requested one.
    Subsumed,
    /// New entry.
    Created,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Storage for cache entries, shared by a session.
#[derive(Debug, Default)]
pub struct CacheStorage {
    entries: Mutex<Vec<Arc<CacheEntry>>>,
    counters: CacheCounters,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry to use for `key`, creating one if nothing usable
    /// exists.
    ///
    /// Unreferenced entries that are expired or incomplete are evicted
    /// first.
    pub fn acquire(&self, key: CacheKey, config: &CacheConfig) -> (CacheEntryHandle, CacheLookup) {
        let mut entries = self.entries.lock();
        self.evict(&mut entries);

        if let Some(entry) = entries.iter().find(|e| e.key == key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(entry = %entry.id, %key, "cache hit");
            return (CacheEntryHandle::new(entry.clone()), CacheLookup::Hit);
        }

        let subsuming = entries
            .iter()
            .find(|e| e.is_complete() && e.key.subsumes(&key));
        if let Some(entry) = subsuming {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(entry = %entry.id, %key, cached = %entry.key, "cache hit through subsuming key");
            return (CacheEntryHandle::new(entry.clone()), CacheLookup::Subsumed);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(CacheEntry::new(key, config));
        debug!(entry = %entry.id, key = %entry.key, "cache entry created");
        entries.push(entry.clone());

        (CacheEntryHandle::new(entry), CacheLookup::Created)
    }

    fn evict(&self, entries: &mut Vec<Arc<CacheEntry>>) {
        let now = Instant::now();
        entries.retain(|entry| {
            let evict = entry.refs() == 0 && (!entry.is_complete() || entry.is_expired(now));
            if evict {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(entry = %entry.id, key = %entry.key, rows = entry.len(), "cache entry evicted");
            }
            !evict
        });
    }

    /// Drop every unreferenced entry.
    pub fn clear(&self) {
        self.entries.lock().retain(|e| e.refs() > 0);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.counters.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.counters.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn config(ttl: Duration) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl,
            max_rows: None,
        }
    }

    fn key(limit: Option<u64>) -> CacheKey {
        CacheKey {
            source: "mem".to_string(),
            arguments: Vec::new(),
            columns: BTreeSet::new(),
            conditions: Vec::new(),
            offset: 0,
            limit,
        }
    }

    fn row(v: i64) -> CachedRow {
        CachedRow::new(vec![ScalarValue::Integer(v)], Vec::new())
    }

    #[test]
    fn reuse_complete_entry() {
        let storage = CacheStorage::new();
        let conf = config(Duration::from_secs(60));

        let (h1, lookup) = storage.acquire(key(None), &conf);
        assert_eq!(CacheLookup::Created, lookup);
        h1.entry().append(0, row(1));
        h1.entry().mark_complete();
        drop(h1);

        let (h2, lookup) = storage.acquire(key(None), &conf);
        assert_eq!(CacheLookup::Hit, lookup);
        assert_eq!(1, h2.entry().len());

        let (_h3, lookup) = storage.acquire(key(Some(5)), &conf);
        assert_eq!(CacheLookup::Subsumed, lookup);
        assert_eq!(1, storage.len());
    }

    #[test]
    fn incomplete_unreferenced_entry_evicted() {
        let storage = CacheStorage::new();
        let conf = config(Duration::from_secs(60));

        let (h, _) = storage.acquire(key(None), &conf);
        h.entry().append(0, row(1));
        drop(h);

        let (_h, lookup) = storage.acquire(key(None), &conf);
        assert_eq!(CacheLookup::Created, lookup);
        assert_eq!(1, storage.evictions());
    }

    #[test]
    fn referenced_entry_shared_while_incomplete() {
        let storage = CacheStorage::new();
        let conf = config(Duration::from_secs(60));

        let (h1, _) = storage.acquire(key(None), &conf);
        let (h2, lookup) = storage.acquire(key(None), &conf);
        assert_eq!(CacheLookup::Hit, lookup);
        assert_eq!(h1.entry().id(), h2.entry().id());
        assert_eq!(2, h1.entry().refs());

        // Second writer for the same index is ignored.
        h1.entry().append(0, row(1));
        h2.entry().append(0, row(2));
        assert_eq!(Some(row(1)), h2.entry().row(0));
    }

    #[test]
    fn expired_entry_evicted() {
        let storage = CacheStorage::new();
        let conf = config(Duration::ZERO);

        let (h, _) = storage.acquire(key(None), &conf);
        h.entry().mark_complete();
        drop(h);

        let (_h, lookup) = storage.acquire(key(None), &conf);
        assert_eq!(CacheLookup::Created, lookup);
    }

    #[test]
    fn bounded_entry_never_completes() {
        let storage = CacheStorage::new();
        let conf = CacheConfig {
            max_rows: Some(1),
            ..config(Duration::from_secs(60))
        };

        let (h, _) = storage.acquire(key(None), &conf);
        h.entry().append(0, row(1));
        h.entry().append(1, row(2));
        h.entry().mark_complete();

        assert_eq!(1, h.entry().len());
        assert!(h.entry().is_truncated());
        assert!(!h.entry().is_complete());
    }
}
