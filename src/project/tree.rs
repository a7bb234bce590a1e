//! Layer-tree model.
//!
//! The layer tree is the structural view of a project's grouping: groups
//! carry names and custom properties, leaves reference layer definitions by
//! id. The legend tree is reconciled against this structure by name, so the
//! model only keeps what that reconciliation needs.

use std::collections::HashMap;

use crate::dom::Element;

/// A node of the layer tree: a named group or a layer leaf.
#[derive(Debug, Clone)]
pub enum LayerTreeNode {
    Group(LayerTreeGroup),
    Layer(LayerTreeLayer),
}

/// A leaf referencing a layer definition.
#[derive(Debug, Clone)]
pub struct LayerTreeLayer {
    /// Display name as shown in the tree
    pub name: String,
    /// Id of the referenced layer definition
    pub layer_id: String,
}

/// A group node with ordered children and custom properties.
#[derive(Debug, Clone, Default)]
pub struct LayerTreeGroup {
    /// Group name, empty for the root
    pub name: String,
    custom_properties: HashMap<String, String>,
    children: Vec<LayerTreeNode>,
}

impl LayerTreeGroup {
    /// Build a group from a `layer-tree-group` element.
    pub fn from_element(el: &Element) -> Self {
        let mut group = Self {
            name: el.attribute("name").unwrap_or("").to_string(),
            ..Self::default()
        };

        for child in el.child_elements() {
            match child.name() {
                "layer-tree-group" => {
                    group
                        .children
                        .push(LayerTreeNode::Group(Self::from_element(child)));
                }
                "layer-tree-layer" => {
                    group.children.push(LayerTreeNode::Layer(LayerTreeLayer {
                        name: child.attribute("name").unwrap_or("").to_string(),
                        layer_id: child.attribute("id").unwrap_or("").to_string(),
                    }));
                }
                "customproperties" => {
                    for prop in child.elements_by_tag_name("property") {
                        if let (Some(key), Some(value)) =
                            (prop.attribute("key"), prop.attribute("value"))
                        {
                            group
                                .custom_properties
                                .insert(key.to_string(), value.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        group
    }

    /// Ordered children of this group.
    pub fn children(&self) -> &[LayerTreeNode] {
        &self.children
    }

    /// A custom property sourced from the tree structure.
    pub fn custom_property(&self, key: &str) -> Option<&str> {
        self.custom_properties.get(key).map(String::as_str)
    }

    /// Find a descendant group by name.
    pub fn find_group(&self, name: &str) -> Option<&LayerTreeGroup> {
        for child in &self.children {
            if let LayerTreeNode::Group(group) = child {
                if group.name == name {
                    return Some(group);
                }
                if let Some(found) = group.find_group(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// All layer leaves transitively under this group, in tree order.
    pub fn find_layers(&self) -> Vec<&LayerTreeLayer> {
        let mut out = Vec::new();
        self.collect_layers(&mut out);
        out
    }

    fn collect_layers<'a>(&'a self, out: &mut Vec<&'a LayerTreeLayer>) {
        for child in &self.children {
            match child {
                LayerTreeNode::Layer(layer) => out.push(layer),
                LayerTreeNode::Group(group) => group.collect_layers(out),
            }
        }
    }
}
