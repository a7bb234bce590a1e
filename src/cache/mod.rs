//! Process-wide memoization stores.
//!
//! Two caches are shared by all request workers: the [`DocumentCache`]
//! (absolute project path → parsed document) and the [`LayerCache`]
//! (composite locator/id/path key → materialized layer). Both guarantee
//! at-most-one materialization per key under concurrent first access and
//! serve subsequent reads without blocking. Entries live until explicit
//! invalidation; nothing is evicted behind a reader's back.

mod document;
mod layer;
mod types;

pub use document::DocumentCache;
pub use layer::LayerCache;
pub use types::{CacheStatistics, CacheStats, InflightSlot, LayerCacheKey};
