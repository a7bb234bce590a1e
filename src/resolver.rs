//! The project resolver facade.
//!
//! A [`ProjectResolver`] binds one parsed project document to the shared
//! resolution services and exposes the full query surface a map service
//! needs per request: layer materialization, aggregated extents and CRS
//! sets, publishing restrictions, legend structure, and the service
//! metadata card.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::crs::{
    combined_extent_and_crs, layer_bbox_in_project_crs, CoordTransform, CrsRef, IdentityTransform,
    Rect, ServiceVersion,
};
use crate::dom::Element;
use crate::layer::{resolve_by_id, resolve_definition, LayerObject, ResolveCtx, ResolverServices};
use crate::project::{layer_id, ProjectDocument};
use crate::service::{
    coverage_service_layer_names, feature_service_layer_names, layer_coordinate_transforms,
    published_layout_elements, LayerDatumTransform, ServiceMetadata,
};

/// Per-project resolution facade.
///
/// Cheap to construct per request: the heavy state (parsed documents,
/// materialized layers) lives in the shared [`ResolverServices`].
pub struct ProjectResolver {
    project: Arc<ProjectDocument>,
    services: Arc<ResolverServices>,
    transform: Arc<dyn CoordTransform>,
    version: ServiceVersion,
}

impl ProjectResolver {
    /// Bind a resolver to an already-loaded project document.
    pub fn new(project: Arc<ProjectDocument>, services: Arc<ResolverServices>) -> Self {
        Self {
            project,
            services,
            transform: Arc::new(IdentityTransform),
            version: ServiceVersion::default(),
        }
    }

    /// Load (or fetch from cache) the project at `path` and bind a
    /// resolver to it. `None` when the document cannot be loaded.
    pub fn open(path: &Path, services: Arc<ResolverServices>) -> Option<Self> {
        let project = services.documents.get(path)?;
        Some(Self::new(project, services))
    }

    /// Use a specific service version for CRS attributes and axis order.
    pub fn with_version(mut self, version: ServiceVersion) -> Self {
        self.version = version;
        self
    }

    /// Use a real coordinate transform instead of the identity default.
    pub fn with_transform(mut self, transform: Arc<dyn CoordTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// The underlying project document.
    pub fn project(&self) -> &Arc<ProjectDocument> {
        &self.project
    }

    /// The shared resolution services this resolver uses.
    pub fn services(&self) -> &Arc<ResolverServices> {
        &self.services
    }

    pub fn version(&self) -> ServiceVersion {
        self.version
    }

    // ----- layer materialization -------------------------------------

    /// Resolve the layer with the given id.
    ///
    /// With `use_cache` the shared layer cache is consulted and fed;
    /// without it a fresh private object is materialized and nothing is
    /// published.
    pub fn resolve_by_id(&self, id: &str, use_cache: bool) -> Option<Arc<LayerObject>> {
        resolve_by_id(
            &self.project,
            &self.services,
            id,
            use_cache,
            &mut ResolveCtx::new(),
        )
    }

    /// Resolve the layer registered under the given name (short name
    /// preferred, first definition wins on duplicates).
    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<LayerObject>> {
        let elem = self.project.layer_definition_by_name(name)?;
        resolve_definition(
            &self.project,
            &self.services,
            elem,
            true,
            &mut ResolveCtx::new(),
        )
    }

    /// Resolve every layer definition in the project, keyed by id.
    ///
    /// Definitions that fail to materialize are skipped; the survivors
    /// are what the service can actually publish.
    pub fn resolve_all_layers(&self) -> HashMap<String, Arc<LayerObject>> {
        let mut resolved = HashMap::new();
        for elem in self.project.layer_definitions() {
            let id = layer_id(elem);
            if id.is_empty() {
                continue;
            }
            match resolve_definition(
                &self.project,
                &self.services,
                elem,
                true,
                &mut ResolveCtx::new(),
            ) {
                Some(layer) => {
                    resolved.insert(id, layer);
                }
                None => debug!(
                    layer = %id,
                    project = %self.project.path().display(),
                    "layer skipped during full resolution"
                ),
            }
        }
        resolved
    }

    // ----- spatial aggregation ---------------------------------------

    /// The project's coordinate reference system.
    pub fn project_crs(&self) -> &CrsRef {
        self.project.crs()
    }

    /// Bounding box of one capability layer node, transformed into the
    /// project CRS with the service version's axis order applied.
    pub fn layer_bbox(&self, layer_node: &Element) -> Option<Rect> {
        layer_bbox_in_project_crs(
            layer_node,
            self.version,
            self.project.crs(),
            self.transform.as_ref(),
        )
    }

    /// Combined extent (union) and CRS set (intersection) over the
    /// direct `Layer` children of a capability group node.
    ///
    /// With `consider_map_extent`, a non-empty configured map rectangle
    /// replaces the aggregated extent wholesale.
    pub fn combined_extent_and_crs(
        &self,
        group: &Element,
        consider_map_extent: bool,
    ) -> (Option<Rect>, HashSet<String>) {
        let override_extent = if consider_map_extent {
            self.project.map_rectangle().filter(|r| !r.is_empty())
        } else {
            None
        };
        combined_extent_and_crs(
            group,
            self.version,
            self.project.crs(),
            self.transform.as_ref(),
            override_extent,
        )
    }

    /// The output CRS identifiers the project advertises.
    pub fn supported_output_crs_list(&self) -> Vec<String> {
        self.project.supported_output_crs_list()
    }

    /// Project title, falling back to the project file stem.
    pub fn project_title(&self) -> String {
        self.project.title()
    }

    /// The map-canvas extent of the project.
    pub fn map_extent(&self) -> Option<Rect> {
        self.project.extent()
    }

    // ----- publishing surface ----------------------------------------

    /// Layer names withheld from publication, expanded through groups
    /// and mapped to the project's naming mode.
    pub fn restricted_layers(&self) -> &HashSet<String> {
        self.project.restricted_layers()
    }

    /// Explicit drawing order, when the project enables one.
    pub fn custom_layer_order(&self) -> &[String] {
        self.project.custom_layer_order()
    }

    /// Whether consumers must reorder legend drawing to the custom order.
    pub fn update_legend_drawing_order(&self) -> bool {
        self.project.update_legend_drawing_order()
    }

    /// Legend group elements reconciled against the layer tree.
    pub fn legend_group_elements(&self) -> &[Element] {
        self.project.legend_groups()
    }

    /// The service metadata card for the bound version.
    pub fn service_metadata(&self) -> ServiceMetadata {
        ServiceMetadata::from_project(&self.project, self.version)
    }

    /// Datum-transform hints configured per layer.
    pub fn layer_coordinate_transforms(&self) -> Vec<LayerDatumTransform> {
        layer_coordinate_transforms(&self.project)
    }

    /// Print-layout elements the project publishes.
    pub fn published_layout_elements(&self) -> Vec<Element> {
        published_layout_elements(&self.project)
    }

    /// Published feature-service layer names.
    pub fn feature_service_layer_names(&self) -> Vec<String> {
        feature_service_layer_names(&self.project, &self.services)
    }

    /// Published coverage-service layer names.
    pub fn coverage_service_layer_names(&self) -> Vec<String> {
        coverage_service_layer_names(&self.project, &self.services)
    }

    // ----- invalidation ----------------------------------------------

    /// Drop this project's document and layer cache entries, e.g. after
    /// the file changed on disk. The bound document instance stays usable
    /// until dropped; a new resolver picks up the fresh file.
    pub fn invalidate(&self) {
        self.services.documents.invalidate(self.project.path());
        self.services.layers.invalidate_project(self.project.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(content: &str) -> ProjectResolver {
        let project = Arc::new(ProjectDocument::from_str(content, "/p/proj.xml").unwrap());
        ProjectResolver::new(project, Arc::new(ResolverServices::new()))
    }

    const TWO_LAYERS: &str = "<qgis><projectlayers>\
        <maplayer type=\"vector\">\
        <id>a1</id><layername>Alpha</layername><shortname>al</shortname>\
        <datasource>/d/a.shp</datasource></maplayer>\
        <maplayer type=\"raster\">\
        <id>b1</id><layername>Beta</layername>\
        <datasource>/d/b.tif</datasource></maplayer>\
        <maplayer type=\"vector\">\
        <id>broken1</id><datasource>/d/x.shp</datasource></maplayer>\
        </projectlayers></qgis>";

    #[test]
    fn test_resolve_all_layers_skips_invalid() {
        let resolver = resolver(TWO_LAYERS);
        let layers = resolver.resolve_all_layers();
        assert_eq!(layers.len(), 2);
        assert!(layers.contains_key("a1"));
        assert!(layers.contains_key("b1"));
        assert!(!layers.contains_key("broken1"));
    }

    #[test]
    fn test_resolve_by_name_prefers_short_name() {
        let resolver = resolver(TWO_LAYERS);
        let layer = resolver.resolve_by_name("al").unwrap();
        assert_eq!(layer.id(), "a1");
        assert!(
            resolver.resolve_by_name("Alpha").is_none(),
            "short name shadows the display name"
        );
    }

    #[test]
    fn test_combined_extent_uses_map_rectangle_override() {
        let resolver = resolver(
            "<qgis><properties><WMSExtent type=\"QStringList\">\
             <value>1</value><value>2</value><value>3</value><value>4</value>\
             </WMSExtent></properties></qgis>",
        );
        let group = crate::dom::parse_document(
            "<g><Layer><BoundingBox minx=\"0\" miny=\"0\" maxx=\"10\" maxy=\"10\" CRS=\"EPSG:4326\"/></Layer></g>",
        )
        .unwrap();

        let (bbox, _) = resolver.combined_extent_and_crs(&group, true);
        let bbox = bbox.unwrap();
        assert_eq!(
            (bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max),
            (1.0, 2.0, 3.0, 4.0)
        );

        let (bbox, _) = resolver.combined_extent_and_crs(&group, false);
        assert_eq!(bbox.unwrap().x_max, 10.0);
    }

    #[test]
    fn test_invalidate_clears_project_layer_entries() {
        let resolver = resolver(TWO_LAYERS);
        resolver.resolve_all_layers();
        assert!(!resolver.services().layers.is_empty());

        resolver.invalidate();
        assert!(resolver.services().layers.is_empty());
    }
}
