//! Project documents and their load-time indexes.
//!
//! A [`ProjectDocument`] is the parsed source artifact of one project:
//! the element tree, the layer-definition indexes (by id and by external
//! name), the layer tree, the restricted-layer set and the custom layer
//! order. Everything here is computed once at load and immutable afterward;
//! in particular, data-source locators are rewritten to absolute form
//! *before* the document is handed to any shared cache, so readers only
//! ever observe absolute locators.

mod properties;
mod tree;

pub use tree::{LayerTreeGroup, LayerTreeLayer, LayerTreeNode};

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::crs::{project_crs, CrsRef, Rect};
use crate::dom::{parse_document, DomError, Element};
use crate::legend;
use crate::locator::normalize_locator;

/// Errors raised while loading a project document.
///
/// These are the only structural faults in the crate; once a document is
/// loaded, resolution failures communicate through absent values.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The project file could not be read
    #[error("failed to read project file: {0}")]
    Io(#[from] io::Error),

    /// The project file is not well-formed XML
    #[error("failed to parse project file: {0}")]
    Parse(#[from] DomError),
}

/// Id of a layer definition element.
///
/// Concrete definitions carry an `id` child element; embedded references
/// carry an `id` attribute instead.
pub fn layer_id(layer_elem: &Element) -> String {
    match layer_elem.first_child_element("id") {
        Some(el) => el.text(),
        None => layer_elem.attribute("id").unwrap_or("").to_string(),
    }
}

/// External-facing name of a layer definition: the short name when present,
/// the display name otherwise.
pub fn layer_name(layer_elem: &Element) -> String {
    if let Some(short) = layer_elem.first_child_element("shortname") {
        let short = short.text();
        if !short.is_empty() {
            return short;
        }
    }
    layer_elem
        .first_child_element("layername")
        .map(|el| el.text())
        .unwrap_or_default()
}

/// A parsed, indexed project document.
#[derive(Debug)]
pub struct ProjectDocument {
    path: PathBuf,
    root: Element,
    layer_elements: Vec<Element>,
    index_by_id: HashMap<String, usize>,
    index_by_name: HashMap<String, usize>,
    layer_tree: Option<LayerTreeGroup>,
    restricted_layers: HashSet<String>,
    custom_layer_order: Vec<String>,
    legend_groups: Vec<Element>,
    crs: CrsRef,
}

impl ProjectDocument {
    /// Load and index a project document from disk.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        Self::from_str(&content, path)
    }

    /// Parse and index a project document from its textual content.
    ///
    /// `path` is the document's absolute location; it anchors relative
    /// data-source locators and keys the shared document cache.
    pub fn from_str(content: &str, path: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let path = path.into();
        let root = parse_document(content)?;
        let project_path = path.to_string_lossy().into_owned();

        // Commit absolute locators into the owned tree now, before the
        // document can be published to a shared cache.
        let mut layer_elements: Vec<Element> = root
            .elements_by_tag_name("maplayer")
            .into_iter()
            .cloned()
            .collect();
        for layer_elem in &mut layer_elements {
            if let Some(datasource) = layer_elem.first_child_element_mut("datasource") {
                let uri = datasource.text();
                let absolute = normalize_locator(&uri, &project_path);
                if absolute != uri {
                    datasource.set_text(absolute);
                }
            }
        }

        let mut index_by_id = HashMap::new();
        let mut index_by_name = HashMap::new();
        for (idx, layer_elem) in layer_elements.iter().enumerate() {
            let id = layer_id(layer_elem);
            if !id.is_empty() {
                index_by_id.entry(id).or_insert(idx);
            }
            let name = layer_name(layer_elem);
            if !name.is_empty() {
                // First-seen binding wins on duplicate names.
                index_by_name.entry(name).or_insert(idx);
            }
        }

        let layer_tree = root
            .first_child_element("layer-tree-group")
            .map(LayerTreeGroup::from_element);

        let crs = project_crs(&root);

        let mut doc = Self {
            path,
            root,
            layer_elements,
            index_by_id,
            index_by_name,
            layer_tree,
            restricted_layers: HashSet::new(),
            custom_layer_order: Vec::new(),
            legend_groups: Vec::new(),
            crs,
        };

        doc.restricted_layers = legend::compute_restricted_layers(&doc);
        doc.custom_layer_order = doc.read_custom_layer_order();
        doc.legend_groups = legend::find_legend_group_elements(&doc);

        debug!(
            path = %doc.path.display(),
            layers = doc.layer_elements.len(),
            restricted = doc.restricted_layers.len(),
            "project document loaded"
        );

        Ok(doc)
    }

    fn read_custom_layer_order(&self) -> Vec<String> {
        let Some(order) = self
            .root
            .first_child_element("layer-tree-canvas")
            .and_then(|canvas| canvas.first_child_element("custom-order"))
        else {
            return Vec::new();
        };
        if order.attribute("enabled") != Some("1") {
            return Vec::new();
        }
        order.child_elements().map(|item| item.text()).collect()
    }

    /// Absolute path of the project file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root element of the document.
    ///
    /// The root keeps the source text as written; normalized (absolute)
    /// data-source locators are only visible through
    /// [`layer_definitions`](Self::layer_definitions) and the indexed
    /// lookups.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// All layer definition elements, in load order, with absolute
    /// data-source locators.
    pub fn layer_definitions(&self) -> &[Element] {
        &self.layer_elements
    }

    /// Number of indexed layer definitions.
    pub fn layer_count(&self) -> usize {
        self.layer_elements.len()
    }

    /// Layer definition by id.
    pub fn layer_definition_by_id(&self, id: &str) -> Option<&Element> {
        self.index_by_id.get(id).map(|&idx| &self.layer_elements[idx])
    }

    /// Layer definition by external name (short name preferred).
    pub fn layer_definition_by_name(&self, name: &str) -> Option<&Element> {
        self.index_by_name
            .get(name)
            .map(|&idx| &self.layer_elements[idx])
    }

    /// External-facing names of all layers, in load order.
    pub fn layers_names(&self) -> Vec<String> {
        self.layer_elements.iter().map(layer_name).collect()
    }

    /// The structural layer tree, when the document carries one.
    pub fn layer_tree(&self) -> Option<&LayerTreeGroup> {
        self.layer_tree.as_ref()
    }

    /// Identifiers of layers excluded from service exposure.
    pub fn restricted_layers(&self) -> &HashSet<String> {
        &self.restricted_layers
    }

    /// The explicit drawing order, empty unless enabled in the document.
    pub fn custom_layer_order(&self) -> &[String] {
        &self.custom_layer_order
    }

    /// Whether legend-consuming queries must apply the custom drawing order.
    pub fn update_legend_drawing_order(&self) -> bool {
        !self.custom_layer_order.is_empty()
    }

    /// Legend group nodes, reconciled against the layer tree at load time.
    pub fn legend_groups(&self) -> &[Element] {
        &self.legend_groups
    }

    /// The legend element of the document.
    pub fn legend_elem(&self) -> Option<&Element> {
        self.root.first_child_element("legend")
    }

    /// The `properties` element of the document.
    pub fn properties_elem(&self) -> Option<&Element> {
        self.root.first_child_element("properties")
    }

    /// The project CRS, read once at load.
    pub fn crs(&self) -> &CrsRef {
        &self.crs
    }

    /// Project title, falling back to the project file stem.
    pub fn title(&self) -> String {
        if let Some(title) = self.root.first_child_element("title") {
            let title = title.text();
            if !title.is_empty() {
                return title;
            }
        }
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The map-canvas extent, absent when any coordinate fails to parse.
    pub fn extent(&self) -> Option<Rect> {
        let extent = self
            .root
            .first_child_element("mapcanvas")?
            .first_child_element("extent")?;
        let coord = |name: &str| -> Option<f64> {
            extent.first_child_element(name)?.text().trim().parse().ok()
        };
        Some(Rect::new(
            coord("xmin")?,
            coord("ymin")?,
            coord("xmax")?,
            coord("ymax")?,
        ))
    }

    /// The fixed service extent configured in the project properties.
    ///
    /// The four `value` entries are ordered xmin, ymin, xmax, ymax;
    /// unparsable entries read as zero, matching the legacy format.
    pub fn map_rectangle(&self) -> Option<Rect> {
        let properties = self.properties_elem()?;
        let extent = properties.first_child_element("WMSExtent")?;
        let values = extent.elements_by_tag_name("value");
        if values.len() < 4 {
            return None;
        }
        let coord = |idx: usize| values[idx].text().trim().parse().unwrap_or(0.0);
        Some(Rect::new(coord(0), coord(1), coord(2), coord(3)))
    }

    /// Whether external identifiers are layer ids rather than names.
    pub fn use_layer_ids(&self) -> bool {
        self.properties_elem()
            .map(|p| properties::bool_property(p, "WMSUseLayerIDs"))
            .unwrap_or(false)
    }

    /// Configured restricted layer/group names, before expansion.
    pub fn restricted_layer_names(&self) -> Vec<String> {
        self.properties_elem()
            .map(|p| properties::string_list_property(p, "WMSRestrictedLayers"))
            .unwrap_or_default()
    }

    /// CRS authority codes the service may answer in.
    ///
    /// Prefers the explicit CRS list, then the legacy numeric EPSG list,
    /// and finally falls back to the project CRS plus the two ubiquitous
    /// codes every client expects.
    pub fn supported_output_crs_list(&self) -> Vec<String> {
        if let Some(properties) = self.properties_elem() {
            if let Some(crs_list) = properties.first_child_element("WMSCrsList") {
                return crs_list
                    .elements_by_tag_name("value")
                    .iter()
                    .map(|v| v.text())
                    .collect();
            }
            if let Some(epsg_list) = properties.first_child_element("WMSEpsgList") {
                return epsg_list
                    .elements_by_tag_name("value")
                    .iter()
                    .filter_map(|v| v.text().trim().parse::<i64>().ok())
                    .map(|nr| format!("EPSG:{nr}"))
                    .collect();
            }
        }

        let project_crs_id = self.crs.auth_id().to_string();
        let mut list = vec![project_crs_id.clone()];
        for fallback in ["EPSG:4326", "EPSG:3857"] {
            if !project_crs_id.eq_ignore_ascii_case(fallback) {
                list.push(fallback.to_string());
            }
        }
        list
    }

    /// A string property from the `properties` element.
    pub fn string_property(&self, key: &str) -> Option<String> {
        self.properties_elem()
            .and_then(|p| properties::string_property(p, key))
    }

    /// A boolean property from the `properties` element.
    pub fn bool_property(&self, key: &str) -> bool {
        self.properties_elem()
            .map(|p| properties::bool_property(p, key))
            .unwrap_or(false)
    }

    /// An integer property from the `properties` element.
    pub fn int_property(&self, key: &str) -> Option<i32> {
        self.properties_elem()
            .and_then(|p| properties::int_property(p, key))
    }

    /// A string-list property from the `properties` element.
    pub fn string_list_property(&self, key: &str) -> Vec<String> {
        self.properties_elem()
            .map(|p| properties::string_list_property(p, key))
            .unwrap_or_default()
    }
}
