//! Process-wide project document cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::cache::types::{CacheStats, CacheStatistics, InflightSlot};
use crate::project::ProjectDocument;

/// Shared cache of parsed project documents, keyed by absolute path.
///
/// Parsing happens at most once per key even under concurrent first
/// access; once a document is published, reads do not block each other.
/// A document that fails to load is not cached, so a later request
/// retries.
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: DashMap<PathBuf, Arc<ProjectDocument>>,
    inflight: DashMap<PathBuf, InflightSlot>,
    stats: CacheStats,
}

impl DocumentCache {
    /// Create an empty document cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the document at `path`, loading and indexing it on first access.
    ///
    /// Returns `None` when the document cannot be read or parsed; the
    /// failure is logged here, callers treat it as an unresolvable
    /// reference.
    pub fn get(&self, path: &Path) -> Option<Arc<ProjectDocument>> {
        if let Some(doc) = self.entries.get(path) {
            self.stats.record_hit();
            return Some(Arc::clone(&doc));
        }

        let slot = self.inflight.entry(path.to_path_buf()).or_default().clone();
        let _guard = slot.lock();

        // Someone else may have finished while we waited for the slot.
        if let Some(doc) = self.entries.get(path) {
            self.stats.record_hit();
            return Some(Arc::clone(&doc));
        }
        self.stats.record_miss();

        match ProjectDocument::load(path) {
            Ok(doc) => {
                let doc = Arc::new(doc);
                self.entries.insert(path.to_path_buf(), Arc::clone(&doc));
                self.inflight.remove(path);
                Some(doc)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "project document load failed");
                self.inflight.remove(path);
                None
            }
        }
    }

    /// Get a cached document without loading on miss.
    pub fn peek(&self, path: &Path) -> Option<Arc<ProjectDocument>> {
        self.entries.get(path).map(|doc| Arc::clone(&doc))
    }

    /// Evict one document, e.g. after the project file changed on disk.
    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.entries.remove(path).is_some();
        if removed {
            debug!(path = %path.display(), "project document invalidated");
        }
        removed
    }

    /// Drop all cached documents.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no documents.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStatistics {
        self.stats.snapshot()
    }
}
