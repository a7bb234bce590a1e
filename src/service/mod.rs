//! Service-facing project settings.
//!
//! Everything here is read straight from the project document's
//! properties block: the service metadata card, datum-transform hints,
//! published layout sheets, and the per-protocol published layer lists.

use tracing::debug;

use crate::crs::ServiceVersion;
use crate::dom::Element;
use crate::layer::{resolve_by_id, ResolveCtx, ResolverServices};
use crate::project::ProjectDocument;

/// Contact block of the service metadata card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub person: Option<String>,
    pub organization: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub mail: Option<String>,
}

/// The service metadata card published for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// Whether the project opts into publishing service capabilities
    pub enabled: bool,
    pub title: String,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    pub online_resource: Option<String>,
    pub contact: ContactDetails,
    pub fees: String,
    pub access_constraints: String,
    /// Maximum request width; suppressed for the legacy service version
    pub max_width: Option<i32>,
    /// Maximum request height; suppressed for the legacy service version
    pub max_height: Option<i32>,
}

impl ServiceMetadata {
    /// Read the metadata card from a project's properties.
    ///
    /// Fields without a configured value fall back the way the service
    /// advertises them: the project title for `title`, `"None"` for fees
    /// and access constraints.
    pub fn from_project(doc: &ProjectDocument, version: ServiceVersion) -> Self {
        let enabled = doc.bool_property("WMSServiceCapabilities");
        if !enabled {
            debug!(
                project = %doc.path().display(),
                "project does not publish service capabilities"
            );
        }
        let (max_width, max_height) = if version.is_legacy() {
            (None, None)
        } else {
            (
                doc.int_property("WMSMaxWidth").filter(|w| *w > 0),
                doc.int_property("WMSMaxHeight").filter(|h| *h > 0),
            )
        };
        Self {
            enabled,
            title: doc
                .string_property("WMSServiceTitle")
                .unwrap_or_else(|| doc.title()),
            abstract_text: doc.string_property("WMSServiceAbstract"),
            keywords: doc.string_list_property("WMSKeywordList"),
            online_resource: doc.string_property("WMSOnlineResource"),
            contact: ContactDetails {
                person: doc.string_property("WMSContactPerson"),
                organization: doc.string_property("WMSContactOrganization"),
                position: doc.string_property("WMSContactPosition"),
                phone: doc.string_property("WMSContactPhone"),
                mail: doc.string_property("WMSContactMail"),
            },
            fees: doc
                .string_property("WMSFees")
                .unwrap_or_else(|| "None".to_string()),
            access_constraints: doc
                .string_property("WMSAccessConstraints")
                .unwrap_or_else(|| "None".to_string()),
            max_width,
            max_height,
        }
    }
}

/// A per-layer datum-transform hint recorded in the map canvas block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDatumTransform {
    pub layer_id: String,
    pub src_auth_id: Option<String>,
    pub dest_auth_id: Option<String>,
    pub src_datum_transform: i32,
    pub dest_datum_transform: i32,
}

/// The datum-transform hints configured for the project's layers.
pub fn layer_coordinate_transforms(doc: &ProjectDocument) -> Vec<LayerDatumTransform> {
    let Some(info) = doc
        .root()
        .first_child_element("mapcanvas")
        .and_then(|canvas| canvas.first_child_element("layer_coordinate_transform_info"))
    else {
        return Vec::new();
    };
    info.elements_by_tag_name("layer_coordinate_transform")
        .into_iter()
        .filter_map(|entry| {
            Some(LayerDatumTransform {
                layer_id: entry.attribute("layerid")?.to_string(),
                src_auth_id: entry.attribute("srcAuthId").map(str::to_string),
                dest_auth_id: entry.attribute("destAuthId").map(str::to_string),
                src_datum_transform: transform_index(entry, "srcDatumTransform"),
                dest_datum_transform: transform_index(entry, "destDatumTransform"),
            })
        })
        .collect()
}

fn transform_index(entry: &Element, attr: &str) -> i32 {
    entry
        .attribute(attr)
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1)
}

/// The print-layout elements the project publishes: every layout block
/// except those restricted by title.
pub fn published_layout_elements(doc: &ProjectDocument) -> Vec<Element> {
    let restricted = doc.string_list_property("WMSRestrictedComposers");
    doc.root()
        .elements_by_tag_name("Composer")
        .into_iter()
        .filter(|composer| {
            composer
                .attribute("title")
                .map(|title| !restricted.iter().any(|r| r == title))
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Names under which the project's feature-service layers are published.
pub fn feature_service_layer_names(
    doc: &ProjectDocument,
    services: &ResolverServices,
) -> Vec<String> {
    published_names(doc, services, "WFSLayers")
}

/// Names under which the project's coverage-service layers are published.
pub fn coverage_service_layer_names(
    doc: &ProjectDocument,
    services: &ResolverServices,
) -> Vec<String> {
    published_names(doc, services, "WCSLayers")
}

fn published_names(
    doc: &ProjectDocument,
    services: &ResolverServices,
    property: &str,
) -> Vec<String> {
    let use_ids = doc.use_layer_ids();
    let mut names = Vec::new();
    for id in doc.string_list_property(property) {
        let Some(layer) = resolve_by_id(doc, services, &id, true, &mut ResolveCtx::new()) else {
            debug!(
                layer = %id,
                project = %doc.path().display(),
                "published layer list references an unresolvable layer"
            );
            continue;
        };
        if use_ids {
            names.push(id);
        } else {
            names.push(layer.external_name().to_string());
        }
    }
    names
}
