//! Materialized layer objects.

use crate::crs::CrsRef;
use crate::dom::Element;
use crate::project::layer_id;

/// Concrete layer kinds.
///
/// Embedded references are not a kind of their own: they delegate to a
/// definition in another project document before materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Vector,
    Raster,
}

impl LayerKind {
    /// Map a definition's `type` attribute to a kind.
    pub fn from_type_attr(value: &str) -> Option<Self> {
        match value {
            "vector" => Some(Self::Vector),
            "raster" => Some(Self::Raster),
            _ => None,
        }
    }

    /// The `type` attribute spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Raster => "raster",
        }
    }
}

/// Field metadata of a vector layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerField {
    /// Field name
    pub name: String,
    /// Configured edit widget, when one is set
    pub edit_widget: Option<String>,
    /// Target layer id of a value-relation widget
    pub value_relation_layer_id: Option<String>,
}

/// A join specification referencing another layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerJoin {
    /// Id of the join-target layer
    pub target_layer_id: String,
    /// Join field on the target layer
    pub join_field: Option<String>,
    /// Join field on this layer
    pub target_field: Option<String>,
}

/// The materialized, usable representation of a layer definition.
///
/// Attribute-level parsing of the definition lives here, not in the
/// resolution engine. A definition missing its essentials (id, display
/// name, data source) reports itself invalid and materialization yields
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerObject {
    kind: LayerKind,
    id: String,
    name: String,
    short_name: Option<String>,
    source: String,
    crs: Option<CrsRef>,
    fields: Vec<LayerField>,
    joins: Vec<LayerJoin>,
}

impl LayerObject {
    /// Populate a layer object of the given kind from its definition.
    ///
    /// `absolute_source` is the already-normalized data-source locator.
    /// Returns `None` when the populated object would be invalid.
    pub fn from_definition(kind: LayerKind, elem: &Element, absolute_source: &str) -> Option<Self> {
        let id = layer_id(elem);
        let name = elem
            .first_child_element("layername")
            .map(|el| el.text())
            .unwrap_or_default();
        if id.is_empty() || name.is_empty() || absolute_source.is_empty() {
            return None;
        }

        let short_name = elem
            .first_child_element("shortname")
            .map(|el| el.text())
            .filter(|s| !s.is_empty());

        let crs = elem
            .first_child_element("srs")
            .and_then(|srs| srs.first_child_element("spatialrefsys"))
            .and_then(|refsys| refsys.first_child_element("authid"))
            .map(|el| CrsRef::from_ogc(&el.text()))
            .filter(CrsRef::is_valid);

        let (fields, joins) = match kind {
            LayerKind::Vector => (read_fields(elem), read_joins(elem)),
            LayerKind::Raster => (Vec::new(), Vec::new()),
        };

        Some(Self {
            kind,
            id,
            name,
            short_name,
            source: absolute_source.to_string(),
            crs,
            fields,
            joins,
        })
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    /// External-facing name: the short name when present.
    pub fn external_name(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.name)
    }

    /// Absolute data-source locator.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn crs(&self) -> Option<&CrsRef> {
        self.crs.as_ref()
    }

    pub fn fields(&self) -> &[LayerField] {
        &self.fields
    }

    pub fn joins(&self) -> &[LayerJoin] {
        &self.joins
    }

    /// Ids of layers referenced by value-relation fields.
    pub fn value_relation_layer_ids(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter_map(|f| f.value_relation_layer_id.as_deref())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(kind: LayerKind, id: &str, name: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            name: name.to_string(),
            short_name: None,
            source: "/test/source".to_string(),
            crs: None,
            fields: Vec::new(),
            joins: Vec::new(),
        }
    }
}

fn read_fields(elem: &Element) -> Vec<LayerField> {
    let Some(edit_types) = elem.first_child_element("edittypes") else {
        return Vec::new();
    };
    edit_types
        .elements_by_tag_name("edittype")
        .into_iter()
        .filter_map(|et| {
            let name = et.attribute("name")?.to_string();
            let edit_widget = et.attribute("widgetv2type").map(str::to_string);
            let value_relation_layer_id = match edit_widget.as_deref() {
                Some("ValueRelation") => et
                    .first_child_element("widgetv2config")
                    .and_then(|cfg| cfg.attribute("Layer"))
                    .map(str::to_string),
                _ => None,
            };
            Some(LayerField {
                name,
                edit_widget,
                value_relation_layer_id,
            })
        })
        .collect()
}

fn read_joins(elem: &Element) -> Vec<LayerJoin> {
    let Some(joins) = elem.first_child_element("vectorjoins") else {
        return Vec::new();
    };
    joins
        .elements_by_tag_name("join")
        .into_iter()
        .filter_map(|join| {
            Some(LayerJoin {
                target_layer_id: join.attribute("joinLayerId")?.to_string(),
                join_field: join.attribute("joinFieldName").map(str::to_string),
                target_field: join.attribute("targetFieldName").map(str::to_string),
            })
        })
        .collect()
}
