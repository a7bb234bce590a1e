//! Coordinate support: CRS collection and bounding-box aggregation.
//!
//! These functions read spatial metadata out of layer and group nodes and
//! aggregate it across group hierarchies. Every failure mode degrades to an
//! absent value; a layer with unparsable geometry simply contributes
//! nothing to its group.

mod types;

pub use types::{
    CoordTransform, CrsRef, IdentityTransform, Rect, ServiceVersion, DEFAULT_CRS_AUTH_ID,
};

use std::collections::HashSet;

use crate::dom::Element;

/// The project-wide CRS, read from the map-canvas destination CRS.
///
/// Falls back to [`DEFAULT_CRS_AUTH_ID`] when the project does not declare
/// one.
pub fn project_crs(root: &Element) -> CrsRef {
    let auth_id = root
        .first_child_element("mapcanvas")
        .and_then(|canvas| canvas.first_child_element("destinationsrs"))
        .and_then(|srs| srs.first_child_element("spatialrefsys"))
        .and_then(|refsys| refsys.first_child_element("authid"));

    match auth_id {
        Some(el) => CrsRef::from_ogc(&el.text()),
        None => CrsRef::from_ogc(DEFAULT_CRS_AUTH_ID),
    }
}

/// Collect every CRS authority code declared under a node.
///
/// Both the current `CRS` tag and the legacy `SRS` tag are recognized and
/// unioned. Returns `None` only when there is no node at all, which callers
/// must distinguish from a node that declares no codes.
pub fn crs_set(node: Option<&Element>) -> Option<HashSet<String>> {
    let node = node?;
    let mut set = HashSet::new();
    for el in node.elements_by_tag_name("CRS") {
        set.insert(el.text());
    }
    for el in node.elements_by_tag_name("SRS") {
        set.insert(el.text());
    }
    Some(set)
}

/// Read a layer node's bounding box and express it in the project CRS.
///
/// Returns `None` when the node carries no `BoundingBox` child, any numeric
/// attribute fails to parse, the extents are inverted, the declared CRS is
/// invalid, or the transform declines. Transform failure degrades to
/// `None`; it never surfaces as an error.
pub fn layer_bbox_in_project_crs(
    layer_node: &Element,
    version: ServiceVersion,
    project_crs: &CrsRef,
    transform: &dyn CoordTransform,
) -> Option<Rect> {
    let bbox_elem = layer_node.first_child_element("BoundingBox")?;

    let x_min: f64 = bbox_elem.attribute("minx")?.parse().ok()?;
    let y_min: f64 = bbox_elem.attribute("miny")?.parse().ok()?;
    let x_max: f64 = bbox_elem.attribute("maxx")?.parse().ok()?;
    let y_max: f64 = bbox_elem.attribute("maxy")?.parse().ok()?;
    if x_max < x_min || y_max < y_min {
        return None;
    }

    let layer_crs = CrsRef::from_ogc(bbox_elem.attribute(version.crs_attribute()).unwrap_or(""));
    if !layer_crs.is_valid() {
        return None;
    }

    let mut rect = Rect::new(x_min, y_min, x_max, y_max);
    if !version.is_legacy() && layer_crs.axis_inverted() {
        rect = rect.inverted();
    }

    transform.transform_bbox(rect, &layer_crs, project_crs)
}

/// Aggregate the extent and CRS set of a group's direct layer children.
///
/// The combined bounding box is the union of the children's boxes (the
/// first non-empty box seeds it); the combined CRS set is the intersection
/// (only codes valid for every child are valid for the group; the first
/// child seeds the set). When `map_extent_override` carries a non-empty
/// rectangle, it replaces the computed union wholesale.
pub fn combined_extent_and_crs(
    group: &Element,
    version: ServiceVersion,
    project_crs: &CrsRef,
    transform: &dyn CoordTransform,
    map_extent_override: Option<Rect>,
) -> (Option<Rect>, HashSet<String>) {
    let mut combined_bbox: Option<Rect> = None;
    let mut combined_crs: Option<HashSet<String>> = None;

    for child in group.child_elements() {
        if child.name() != "Layer" {
            continue;
        }

        if let Some(bbox) = layer_bbox_in_project_crs(child, version, project_crs, transform) {
            if !bbox.is_empty() {
                match combined_bbox.as_mut() {
                    Some(existing) => existing.combine_extent_with(&bbox),
                    None => combined_bbox = Some(bbox),
                }
            }
        }

        if let Some(child_set) = crs_set(Some(child)) {
            combined_crs = Some(match combined_crs.take() {
                Some(existing) => existing.intersection(&child_set).cloned().collect(),
                None => child_set,
            });
        }
    }

    if let Some(map_rect) = map_extent_override {
        if !map_rect.is_empty() {
            combined_bbox = Some(map_rect);
        }
    }

    (combined_bbox, combined_crs.unwrap_or_default())
}
