// Fingerprint Cache
// Bounded map from exact text to its shared fingerprint, computed once per text

use crate::models::TextFingerprint;
use mini_moka::sync::{Cache, ConcurrentCacheExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }
}

/// Bounded fingerprint store shared by every request. Values are immutable once inserted.
/// A miss is computed by exactly one caller; concurrent callers for the same text wait on it.
pub struct FingerprintCache {
    entries: Cache<String, Arc<TextFingerprint>>,
    in_flight: Mutex<HashMap<String, Arc<OnceLock<Arc<TextFingerprint>>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    inserted: AtomicU64,
}

impl FingerprintCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Cache::builder().max_capacity(capacity as u64).build(),
            in_flight: Mutex::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
        }
    }

    /// Cached value for `text`, or the result of `compute`. `compute` runs at most once per
    /// text while it is resident or being computed.
    pub fn get_or_insert_with<F>(&self, text: &str, compute: F) -> Arc<TextFingerprint>
    where
        F: FnOnce() -> TextFingerprint,
    {
        let key = text.to_string();
        if let Some(hit) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let cell = {
            let mut in_flight = self.lock_in_flight();
            // Re-check under the lock: a finished computation inserts before leaving the map
            if let Some(hit) = self.entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let mut computed = false;
        let fingerprint = Arc::clone(cell.get_or_init(|| {
            computed = true;
            Arc::new(compute())
        }));

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.inserted.fetch_add(1, Ordering::Relaxed);
            self.entries.insert(key.clone(), Arc::clone(&fingerprint));
            let mut in_flight = self.lock_in_flight();
            if in_flight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                in_flight.remove(&key);
            }
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        fingerprint
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceLock<Arc<TextFingerprint>>>>> {
        // The map only holds cells; a poisoned lock is still usable
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counters plus the resident entry count after pending evictions are applied
    pub fn stats(&self) -> CacheStats {
        let entries = self.len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.inserted.load(Ordering::Relaxed).saturating_sub(entries as u64),
            entries,
            capacity: self.capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.sync();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
