//! Layer materialization: turning definition elements into cached
//! [`LayerObject`]s, including dependency wiring and embedded delegation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::cache::{DocumentCache, LayerCache, LayerCacheKey};
use crate::layer::registry::LayerRegistry;
use crate::layer::types::{LayerKind, LayerObject};
use crate::locator::{normalize_locator, normalize_path};
use crate::project::{layer_id, ProjectDocument};
use crate::dom::Element;

/// Shared resolution services: the two process-wide caches plus the
/// per-project registry of already-materialized layers.
#[derive(Debug, Default)]
pub struct ResolverServices {
    pub documents: DocumentCache,
    pub layers: LayerCache,
    pub registry: LayerRegistry,
}

impl ResolverServices {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-call resolution state.
///
/// `visited` holds the `(project path, layer id)` pairs currently on the
/// resolution stack. A pair showing up twice means the reference graph
/// cycles (self-joins, mutually embedding projects) and that branch fails
/// closed instead of recursing forever.
#[derive(Debug, Default)]
pub(crate) struct ResolveCtx {
    visited: HashSet<(PathBuf, String)>,
}

impl ResolveCtx {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Resolve a layer by id within `doc`.
pub(crate) fn resolve_by_id(
    doc: &ProjectDocument,
    services: &ResolverServices,
    id: &str,
    use_cache: bool,
    ctx: &mut ResolveCtx,
) -> Option<Arc<LayerObject>> {
    let elem = doc.layer_definition_by_id(id)?;
    resolve_definition(doc, services, elem, use_cache, ctx)
}

/// Resolve a single layer definition element.
pub(crate) fn resolve_definition(
    doc: &ProjectDocument,
    services: &ResolverServices,
    elem: &Element,
    use_cache: bool,
    ctx: &mut ResolveCtx,
) -> Option<Arc<LayerObject>> {
    let id = layer_id(elem);
    let frame = (doc.path().to_path_buf(), id.clone());
    if !ctx.visited.insert(frame.clone()) {
        warn!(
            layer = %id,
            project = %doc.path().display(),
            "cyclic layer reference, failing closed"
        );
        return None;
    }
    let resolved = resolve_definition_inner(doc, services, elem, use_cache, ctx);
    // Only on-stack ancestors count for cycle detection; a diamond (two
    // layers joining the same target) must still resolve.
    ctx.visited.remove(&frame);
    resolved
}

fn resolve_definition_inner(
    doc: &ProjectDocument,
    services: &ResolverServices,
    elem: &Element,
    use_cache: bool,
    ctx: &mut ResolveCtx,
) -> Option<Arc<LayerObject>> {
    let id = layer_id(elem);

    // Dependencies first, before any per-key slot is taken: join targets
    // and expression-referenced layers must be registered whether this
    // layer ends up a cache hit or a fresh materialization.
    add_join_layers(doc, services, elem, ctx);
    add_get_feature_layers(doc, services, elem, ctx);

    let raw_locator = elem
        .first_child_element("datasource")
        .map(|el| el.text())
        .unwrap_or_default();
    let locator = normalize_locator(&raw_locator, &doc.path().to_string_lossy());
    let key = LayerCacheKey::new(locator.clone(), id.clone(), doc.path());

    if use_cache {
        if let Some(layer) = services.layers.get(&key) {
            return Some(register_hit(doc, services, layer, ctx));
        }
    }

    let Some(kind) = elem.attribute("type").and_then(LayerKind::from_type_attr) else {
        if elem.attribute("embedded") == Some("1") {
            return resolve_embedded(doc, services, elem, use_cache, ctx);
        }
        warn!(
            layer = %id,
            project = %doc.path().display(),
            "layer definition has no usable type"
        );
        return None;
    };

    let layer = if use_cache {
        let slot = services.layers.inflight(&key);
        let guard = slot.lock();

        // Another worker may have materialized while we queued on the slot.
        if let Some(layer) = services.layers.get(&key) {
            drop(guard);
            services.layers.finish(&key);
            return Some(register_hit(doc, services, layer, ctx));
        }

        let materialized = LayerObject::from_definition(kind, elem, &locator).map(Arc::new);
        let published = match materialized {
            Some(layer) => {
                services.registry.add(&layer);
                services.layers.insert(key.clone(), Arc::clone(&layer));
                Some(layer)
            }
            None => {
                debug!(
                    layer = %id,
                    project = %doc.path().display(),
                    "layer definition is invalid, nothing cached"
                );
                None
            }
        };
        drop(guard);
        services.layers.finish(&key);
        published?
    } else {
        let layer = Arc::new(LayerObject::from_definition(kind, elem, &locator)?);
        services.registry.add(&layer);
        layer
    };

    if layer.kind() == LayerKind::Vector {
        add_value_relation_layers(doc, services, &layer, ctx);
    }
    Some(layer)
}

/// A cache hit still needs its registry entry and, for vectors, its
/// value-relation targets wired for the current project.
fn register_hit(
    doc: &ProjectDocument,
    services: &ResolverServices,
    layer: Arc<LayerObject>,
    ctx: &mut ResolveCtx,
) -> Arc<LayerObject> {
    services.registry.add(&layer);
    if layer.kind() == LayerKind::Vector {
        add_value_relation_layers(doc, services, &layer, ctx);
    }
    layer
}

/// Delegate an embedded reference to its source project document.
fn resolve_embedded(
    doc: &ProjectDocument,
    services: &ResolverServices,
    elem: &Element,
    use_cache: bool,
    ctx: &mut ResolveCtx,
) -> Option<Arc<LayerObject>> {
    let id = layer_id(elem);
    let Some(project_ref) = elem.attribute("project") else {
        warn!(
            layer = %id,
            project = %doc.path().display(),
            "embedded layer reference without a source project"
        );
        return None;
    };
    let other_path = normalize_path(project_ref, &doc.path().to_string_lossy());
    debug!(
        layer = %id,
        source = %other_path,
        "resolving embedded layer from source project"
    );
    let other = services.documents.get(Path::new(&other_path))?;
    resolve_by_id(&other, services, &id, use_cache, ctx)
}

/// Resolve the join-target layers of a vector definition.
fn add_join_layers(
    doc: &ProjectDocument,
    services: &ResolverServices,
    elem: &Element,
    ctx: &mut ResolveCtx,
) {
    let Some(joins) = elem.first_child_element("vectorjoins") else {
        return;
    };
    for join in joins.elements_by_tag_name("join") {
        let Some(target_id) = join.attribute("joinLayerId") else {
            continue;
        };
        if services.registry.has(target_id) {
            continue;
        }
        if resolve_by_id(doc, services, target_id, true, ctx).is_none() {
            warn!(
                join_target = %target_id,
                project = %doc.path().display(),
                "join target could not be resolved"
            );
        }
    }
}

/// Resolve layers referenced by `getFeature('<name>', ...)` expressions
/// anywhere in the definition. The argument may be a layer id or name.
fn add_get_feature_layers(
    doc: &ProjectDocument,
    services: &ResolverServices,
    elem: &Element,
    ctx: &mut ResolveCtx,
) {
    let text = elem.to_xml_string();
    if !text.contains("getFeature") {
        return;
    }
    for captures in get_feature_regex().captures_iter(&text) {
        let referenced = &captures[1];
        let target = doc
            .layer_definition_by_id(referenced)
            .or_else(|| doc.layer_definition_by_name(referenced));
        match target {
            Some(target) => {
                let _ = resolve_definition(doc, services, target, true, ctx);
            }
            None => debug!(
                referenced = %referenced,
                project = %doc.path().display(),
                "expression references an unknown layer"
            ),
        }
    }
}

fn get_feature_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"getFeature\('([^']*)'").expect("valid expression pattern"))
}

/// Resolve the value-relation targets of a materialized vector layer.
fn add_value_relation_layers(
    doc: &ProjectDocument,
    services: &ResolverServices,
    layer: &Arc<LayerObject>,
    ctx: &mut ResolveCtx,
) {
    let target_ids: Vec<String> = layer
        .value_relation_layer_ids()
        .map(str::to_string)
        .collect();
    for target_id in target_ids {
        if services.registry.has(&target_id) {
            continue;
        }
        if resolve_by_id(doc, services, &target_id, true, ctx).is_none() {
            debug!(
                value_relation_target = %target_id,
                project = %doc.path().display(),
                "value-relation target could not be resolved"
            );
        }
    }
}
