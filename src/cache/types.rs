//! Core types for the shared caches.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cache key uniquely identifying a materialized layer object.
///
/// All three parts are required: the same layer id may appear in several
/// projects, and the same data source may back several layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerCacheKey {
    /// Absolute data-source locator
    pub locator: String,
    /// Layer id within the owning project
    pub layer_id: String,
    /// Absolute path of the owning project document
    pub project_path: PathBuf,
}

impl LayerCacheKey {
    /// Create a new layer cache key.
    pub fn new(
        locator: impl Into<String>,
        layer_id: impl Into<String>,
        project_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            locator: locator.into(),
            layer_id: layer_id.into(),
            project_path: project_path.into(),
        }
    }
}

/// Hit/miss counters for one cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time counter snapshot.
    pub fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
}

/// A per-key materialization slot.
///
/// Holding the slot's lock makes the caller the single materializer for
/// that key; everyone else queues on the same slot and re-checks the cache
/// once they acquire it. Callers must not hold the lock while resolving
/// other keys — the resolution procedure is structured so all recursion
/// happens before the slot is taken.
#[derive(Debug, Clone, Default)]
pub struct InflightSlot {
    lock: Arc<Mutex<()>>,
}

impl InflightSlot {
    /// Block until this caller owns the materialization of the key.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
