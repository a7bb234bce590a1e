//! Registry of layers already materialized for the current project.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::layer::types::LayerObject;

/// Tracks which layer ids have already been materialized, so dependency
/// wiring (joins, value relations, expression references) resolves each
/// target once.
///
/// The registry holds weak references: it never keeps a layer alive past
/// its cache entry, and stale slots are pruned lazily on lookup.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    layers: DashMap<String, Weak<LayerObject>>,
}

impl LayerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a materialized layer under its id. First registration wins.
    pub fn add(&self, layer: &Arc<LayerObject>) {
        self.layers
            .entry(layer.id().to_string())
            .or_insert_with(|| Arc::downgrade(layer));
    }

    /// The registered layer for an id, when it is still alive.
    pub fn get(&self, id: &str) -> Option<Arc<LayerObject>> {
        let entry = self.layers.get(id)?;
        match entry.value().upgrade() {
            Some(layer) => Some(layer),
            None => {
                drop(entry);
                self.layers.remove(id);
                None
            }
        }
    }

    /// Whether a live layer is registered under this id.
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Forget every registration.
    pub fn clear(&self) {
        self.layers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;

    #[test]
    fn test_add_and_get() {
        let registry = LayerRegistry::new();
        let layer = Arc::new(LayerObject::for_tests(LayerKind::Vector, "l1", "One"));
        registry.add(&layer);

        assert!(registry.has("l1"));
        assert!(Arc::ptr_eq(&registry.get("l1").unwrap(), &layer));
        assert!(!registry.has("l2"));
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = LayerRegistry::new();
        let first = Arc::new(LayerObject::for_tests(LayerKind::Vector, "l1", "First"));
        let second = Arc::new(LayerObject::for_tests(LayerKind::Vector, "l1", "Second"));
        registry.add(&first);
        registry.add(&second);

        assert_eq!(registry.get("l1").unwrap().name(), "First");
    }

    #[test]
    fn test_dropped_layer_is_pruned() {
        let registry = LayerRegistry::new();
        let layer = Arc::new(LayerObject::for_tests(LayerKind::Raster, "r1", "Relief"));
        registry.add(&layer);
        drop(layer);

        assert!(!registry.has("r1"), "weak reference must not pin the layer");
        assert!(registry.get("r1").is_none());
    }
}
