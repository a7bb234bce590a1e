//! Process-wide layer object cache.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::cache::types::{CacheStats, CacheStatistics, InflightSlot, LayerCacheKey};
use crate::layer::LayerObject;

/// Shared cache of materialized layer objects, keyed by
/// `(absolute locator, layer id, project path)`.
///
/// Entries are published atomically and fully formed; a resolution that
/// fails publishes nothing. The per-key in-flight slot gives at-most-one
/// materialization under concurrent first access, while hits are served
/// as plain reads.
#[derive(Debug, Default)]
pub struct LayerCache {
    entries: DashMap<LayerCacheKey, Arc<LayerObject>>,
    inflight: DashMap<LayerCacheKey, InflightSlot>,
    stats: CacheStats,
}

impl LayerCache {
    /// Create an empty layer cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a materialized layer.
    pub fn get(&self, key: &LayerCacheKey) -> Option<Arc<LayerObject>> {
        match self.entries.get(key) {
            Some(layer) => {
                self.stats.record_hit();
                Some(Arc::clone(&layer))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Publish a fully formed layer object under its key.
    pub fn insert(&self, key: LayerCacheKey, layer: Arc<LayerObject>) {
        self.entries.insert(key, layer);
    }

    /// The in-flight slot for a key. Lock it before materializing, and
    /// re-check [`get`](Self::get) once the lock is held.
    pub fn inflight(&self, key: &LayerCacheKey) -> InflightSlot {
        self.inflight.entry(key.clone()).or_default().clone()
    }

    /// Drop the in-flight slot once materialization finished (or failed).
    pub fn finish(&self, key: &LayerCacheKey) {
        self.inflight.remove(key);
    }

    /// Evict every layer belonging to a project, on project invalidation.
    pub fn invalidate_project(&self, project_path: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.project_path != project_path);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(
                project = %project_path.display(),
                evicted, "layer cache entries invalidated"
            );
        }
        evicted
    }

    /// Drop all cached layers.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached layers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no layers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStatistics {
        self.stats.snapshot()
    }
}
