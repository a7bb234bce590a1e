//! Integration tests for end-to-end project resolution.
//!
//! These tests verify the complete resolution flows:
//! - Project document load → indexing → layer materialization
//! - Relative locator normalization against the project path
//! - Shared-cache behavior across resolvers (hits, use_cache off, invalidation)
//! - Embedded layer delegation to a second project document
//! - Combined extent/CRS aggregation over capability groups
//!
//! Run with: `cargo test --test project_resolution`

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use mapproject::dom::parse_document;
use mapproject::layer::{LayerKind, ResolverServices};
use mapproject::resolver::ProjectResolver;

// ============================================================================
// Test Helpers
// ============================================================================

/// Write a project file into `dir` and return its path.
fn write_project(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write project file");
    path
}

/// A project with an absolute-source raster and a relative-source vector,
/// both placed in a group that restricts nothing.
fn basic_project() -> String {
    "<qgis>\
     <title>Basic</title>\
     <layer-tree-group>\
       <layer-tree-group name=\"G\">\
         <layer-tree-layer name=\"Relief\" id=\"relief1\"/>\
         <layer-tree-layer name=\"Rivers\" id=\"rivers1\"/>\
       </layer-tree-group>\
     </layer-tree-group>\
     <projectlayers>\
       <maplayer type=\"raster\">\
         <id>relief1</id><layername>Relief</layername>\
         <datasource>/data/relief.tif</datasource>\
       </maplayer>\
       <maplayer type=\"vector\">\
         <id>rivers1</id><layername>Rivers</layername>\
         <datasource>./data/rivers.shp</datasource>\
         <srs><spatialrefsys><authid>EPSG:4326</authid></spatialrefsys></srs>\
       </maplayer>\
     </projectlayers>\
     </qgis>"
        .to_string()
}

fn open_resolver(path: &PathBuf, services: &Arc<ResolverServices>) -> ProjectResolver {
    ProjectResolver::open(path, Arc::clone(services)).expect("project must load")
}

// ============================================================================
// Resolution Flows
// ============================================================================

#[test]
fn test_full_resolution_normalizes_relative_locators() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, "basic.xml", &basic_project());
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&path, &services);

    let layers = resolver.resolve_all_layers();
    assert_eq!(layers.len(), 2);

    let rivers = &layers["rivers1"];
    assert_eq!(rivers.kind(), LayerKind::Vector);
    let expected = format!("{}/data/rivers.shp", dir.path().display());
    assert_eq!(rivers.source(), expected, "relative source made absolute");

    let relief = &layers["relief1"];
    assert_eq!(relief.source(), "/data/relief.tif", "absolute source kept");
}

#[test]
fn test_shared_cache_serves_identical_instances_across_resolvers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, "basic.xml", &basic_project());
    let services = Arc::new(ResolverServices::new());

    let first = open_resolver(&path, &services)
        .resolve_by_id("rivers1", true)
        .unwrap();
    let second = open_resolver(&path, &services)
        .resolve_by_id("rivers1", true)
        .unwrap();
    assert!(
        Arc::ptr_eq(&first, &second),
        "both resolvers must share one cached layer"
    );
    assert!(services.layers.stats().hits >= 1);
}

#[test]
fn test_use_cache_false_bypasses_the_shared_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, "basic.xml", &basic_project());
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&path, &services);

    let private = resolver.resolve_by_id("rivers1", false).unwrap();
    assert_eq!(private.id(), "rivers1");
    assert!(
        services.layers.is_empty(),
        "nothing may be published without use_cache"
    );

    let cached = resolver.resolve_by_id("rivers1", true).unwrap();
    assert!(
        !Arc::ptr_eq(&private, &cached),
        "the uncached object stays private"
    );
}

#[test]
fn test_invalidation_evicts_document_and_layers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, "basic.xml", &basic_project());
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&path, &services);
    resolver.resolve_all_layers();
    assert_eq!(services.layers.len(), 2);

    resolver.invalidate();
    assert!(services.layers.is_empty());
    assert!(services.documents.is_empty());

    // A fresh resolver reloads from disk.
    let reloaded = open_resolver(&path, &services);
    assert_eq!(reloaded.resolve_all_layers().len(), 2);
}

// ============================================================================
// Embedded Projects
// ============================================================================

#[test]
fn test_embedded_layer_delegates_to_source_project() {
    let dir = tempfile::tempdir().unwrap();
    write_project(
        &dir,
        "source.xml",
        "<qgis><projectlayers>\
         <maplayer type=\"vector\">\
         <id>shared1</id><layername>Shared</layername>\
         <datasource>./data/shared.shp</datasource>\
         </maplayer></projectlayers></qgis>",
    );
    let host = write_project(
        &dir,
        "host.xml",
        "<qgis><projectlayers>\
         <maplayer embedded=\"1\" project=\"./source.xml\" id=\"shared1\"/>\
         </projectlayers></qgis>",
    );
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&host, &services);

    let layer = resolver.resolve_by_id("shared1", true).unwrap();
    assert_eq!(layer.name(), "Shared");
    let expected = format!("{}/data/shared.shp", dir.path().display());
    assert_eq!(
        layer.source(),
        expected,
        "locator normalized against the source project, not the host"
    );
    assert_eq!(
        services.documents.len(),
        2,
        "the source project is loaded through the shared document cache"
    );
}

#[test]
fn test_mutually_embedding_projects_fail_closed() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_project(
        &dir,
        "a.xml",
        "<qgis><projectlayers>\
         <maplayer embedded=\"1\" project=\"./b.xml\" id=\"ghost1\"/>\
         </projectlayers></qgis>",
    );
    write_project(
        &dir,
        "b.xml",
        "<qgis><projectlayers>\
         <maplayer embedded=\"1\" project=\"./a.xml\" id=\"ghost1\"/>\
         </projectlayers></qgis>",
    );
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&a, &services);

    assert!(
        resolver.resolve_by_id("ghost1", true).is_none(),
        "the embedding cycle must terminate with no layer"
    );
    assert!(services.layers.is_empty());
}

// ============================================================================
// Spatial Aggregation
// ============================================================================

#[test]
fn test_combined_extent_and_crs_over_group() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(&dir, "basic.xml", &basic_project());
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&path, &services);

    let group = parse_document(
        "<g>\
         <Layer>\
         <BoundingBox minx=\"0\" miny=\"0\" maxx=\"2\" maxy=\"2\" CRS=\"EPSG:4326\"/>\
         <CRS>EPSG:4326</CRS><CRS>EPSG:3857</CRS>\
         </Layer>\
         <Layer>\
         <BoundingBox minx=\"1\" miny=\"1\" maxx=\"3\" maxy=\"3\" CRS=\"EPSG:4326\"/>\
         <CRS>EPSG:4326</CRS>\
         </Layer>\
         </g>",
    )
    .unwrap();

    let (bbox, crs_set) = resolver.combined_extent_and_crs(&group, false);
    let bbox = bbox.expect("two valid boxes must combine");
    assert_eq!(
        (bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max),
        (0.0, 0.0, 3.0, 3.0),
        "extent is the union"
    );
    assert_eq!(
        crs_set,
        ["EPSG:4326".to_string()].into_iter().collect(),
        "CRS set is the intersection"
    );
}

// ============================================================================
// Publishing Surface
// ============================================================================

#[test]
fn test_restricted_group_expands_to_member_layers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        "restricted.xml",
        "<qgis>\
         <layer-tree-group>\
           <layer-tree-group name=\"Internal\">\
             <layer-tree-layer name=\"Secrets\" id=\"sec1\"/>\
           </layer-tree-group>\
           <layer-tree-layer name=\"Public\" id=\"pub1\"/>\
         </layer-tree-group>\
         <properties>\
           <WMSRestrictedLayers type=\"QStringList\"><value>Internal</value></WMSRestrictedLayers>\
         </properties>\
         <projectlayers>\
           <maplayer type=\"vector\"><id>sec1</id><layername>Secrets</layername>\
           <datasource>/d/s.shp</datasource></maplayer>\
           <maplayer type=\"vector\"><id>pub1</id><layername>Public</layername>\
           <datasource>/d/p.shp</datasource></maplayer>\
         </projectlayers>\
         </qgis>",
    );
    let services = Arc::new(ResolverServices::new());
    let resolver = open_resolver(&path, &services);

    let restricted = resolver.restricted_layers();
    assert!(restricted.contains("Secrets"), "group expands to members");
    assert!(!restricted.contains("Public"));
}
