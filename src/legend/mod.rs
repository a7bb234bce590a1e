//! Legend-tree reconciliation and restriction expansion.
//!
//! The legend tree and the layer tree are two parallel views of the same
//! grouping structure. Sibling counts may diverge, so legend groups are
//! matched to layer-tree groups by name with a monotonically advancing
//! sibling index rather than positional pairing. Matched groups are
//! annotated with the short-name/title overrides the layer tree carries;
//! unmatched groups are still emitted, unannotated.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::dom::{parse_document, Element, Node};
use crate::project::{LayerTreeGroup, LayerTreeNode, ProjectDocument};

/// Expand the configured restricted names into the externally visible
/// restricted-layer identifier set.
///
/// A restricted name that matches a layer-tree group restricts every leaf
/// layer transitively under it; any other name restricts itself. The
/// expanded display names are then mapped to the configured identifier
/// form: layer id when the project publishes ids, else short name when one
/// exists, else the display name.
pub(crate) fn compute_restricted_layers(doc: &ProjectDocument) -> HashSet<String> {
    let mut restricted = HashSet::new();
    let Some(tree) = doc.layer_tree() else {
        return restricted;
    };

    let mut expanded: HashSet<String> = HashSet::new();
    for name in doc.restricted_layer_names() {
        if let Some(group) = tree.find_group(&name) {
            for layer in group.find_layers() {
                expanded.insert(layer.name.clone());
            }
        } else {
            expanded.insert(name);
        }
    }

    let use_layer_ids = doc.use_layer_ids();
    for layer in tree.find_layers() {
        if !expanded.contains(&layer.name) {
            continue;
        }
        if use_layer_ids {
            restricted.insert(layer.layer_id.clone());
            continue;
        }
        let short_name = doc
            .layer_definition_by_id(&layer.layer_id)
            .and_then(|el| el.first_child_element("shortname"))
            .map(|el| el.text())
            .filter(|s| !s.is_empty());
        match short_name {
            Some(short) => restricted.insert(short),
            None => restricted.insert(layer.name.clone()),
        };
    }

    restricted
}

/// Collect the legend group nodes of a document, reconciled against the
/// layer tree.
///
/// Matched groups come out annotated with children before their parent;
/// a final sweep appends any legend group the walk did not reach, so every
/// group appears exactly once.
pub(crate) fn find_legend_group_elements(doc: &ProjectDocument) -> Vec<Element> {
    let Some(legend) = doc.legend_elem() else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    let mut emitted: HashSet<*const Element> = HashSet::new();
    if let Some(tree) = doc.layer_tree() {
        groups.extend(annotate_legend_groups(tree, legend, &mut emitted));
    }

    // Groups the walk never reached (nested under unmatched groups, or with
    // no layer tree at all) are still emitted, unannotated. Tracking is by
    // node identity, not name: distinct groups may share a name.
    for group in legend.elements_by_tag_name("legendgroup") {
        if !emitted.contains(&(group as *const Element)) {
            groups.push((*group).clone());
        }
    }

    groups
}

/// The lock-step walk over one level of the legend and layer trees.
///
/// `g` advances only when a legend group finds its layer-tree counterpart,
/// and the scan for a counterpart never runs past the legend child index.
/// This tolerates interleaved non-group siblings but is deliberately not
/// a general matching; consumers depend on the advancing-index semantics.
fn annotate_legend_groups(
    tree_group: &LayerTreeGroup,
    legend_elem: &Element,
    emitted: &mut HashSet<*const Element>,
) -> Vec<Element> {
    let mut out = Vec::new();
    let tree_children = tree_group.children();
    let mut g = 0usize;

    for (i, node) in legend_elem.children().iter().enumerate() {
        let Node::Element(legend_child) = node else {
            continue;
        };
        if legend_child.name() != "legendgroup" {
            continue;
        }

        let mut annotated = legend_child.clone();
        let legend_name = annotated.attribute("name").unwrap_or("").to_string();

        for j in g..(i + 1).min(tree_children.len()) {
            let LayerTreeNode::Group(tree_child) = &tree_children[j] else {
                continue;
            };
            if tree_child.name != legend_name {
                continue;
            }
            g = j;
            if let Some(short) = tree_child.custom_property("wmsShortName") {
                if !short.is_empty() {
                    annotated.set_attribute("shortName", short);
                }
            }
            if let Some(title) = tree_child.custom_property("wmsTitle") {
                if !title.is_empty() {
                    annotated.set_attribute("title", title);
                }
            }
            out.extend(annotate_legend_groups(tree_child, legend_child, emitted));
        }

        emitted.insert(legend_child as *const Element);
        out.push(annotated);
    }

    out
}

/// Id of the layer a legend layer node references.
pub fn layer_id_from_legend_layer(legend_layer: &Element) -> Option<String> {
    legend_layer
        .elements_by_tag_name("legendlayerfile")
        .first()
        .and_then(|el| el.attribute("layerid"))
        .map(str::to_string)
}

/// Names of all subgroups and sublayers under a named group of a *different*
/// project document.
///
/// Used to expand restriction rules that reference a group defined in an
/// embedded project. Any failure to open or parse the document yields an
/// empty set.
pub fn sublayers_of_embedded_group(project_path: &Path, group_name: &str) -> HashSet<String> {
    let mut layer_set = HashSet::new();

    let Ok(content) = fs::read_to_string(project_path) else {
        debug!(path = %project_path.display(), "embedded project not readable");
        return layer_set;
    };
    let Ok(root) = parse_document(&content) else {
        debug!(path = %project_path.display(), "embedded project not parsable");
        return layer_set;
    };
    let Some(legend) = root.first_child_element("legend") else {
        return layer_set;
    };

    for group in legend.elements_by_tag_name("legendgroup") {
        if group.attribute("name") != Some(group_name) {
            continue;
        }
        for sub in group.elements_by_tag_name("legendgroup") {
            if let Some(name) = sub.attribute("name") {
                layer_set.insert(name.to_string());
            }
        }
        for sub in group.elements_by_tag_name("legendlayer") {
            if let Some(name) = sub.attribute("name") {
                layer_set.insert(name.to_string());
            }
        }
    }

    layer_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectDocument;

    fn doc_with(restricted: &str, use_ids: &str) -> ProjectDocument {
        let content = format!(
            "<qgis>\
             <layer-tree-group>\
             <layer-tree-layer name=\"Basemap\" id=\"base1\"/>\
             <layer-tree-group name=\"Internal\">\
             <layer-tree-layer name=\"Drafts\" id=\"drafts1\"/>\
             <layer-tree-group name=\"Deep\">\
             <layer-tree-layer name=\"Secrets\" id=\"secrets1\"/>\
             </layer-tree-group>\
             </layer-tree-group>\
             <layer-tree-layer name=\"Roads\" id=\"roads1\"/>\
             </layer-tree-group>\
             <projectlayers>\
             <maplayer type=\"vector\"><id>base1</id><layername>Basemap</layername></maplayer>\
             <maplayer type=\"vector\"><id>drafts1</id><layername>Drafts</layername></maplayer>\
             <maplayer type=\"vector\"><id>secrets1</id><shortname>sec</shortname><layername>Secrets</layername></maplayer>\
             <maplayer type=\"vector\"><id>roads1</id><layername>Roads</layername></maplayer>\
             </projectlayers>\
             <properties>\
             <WMSRestrictedLayers type=\"QStringList\">{restricted}</WMSRestrictedLayers>\
             <WMSUseLayerIDs type=\"bool\">{use_ids}</WMSUseLayerIDs>\
             </properties>\
             </qgis>"
        );
        ProjectDocument::from_str(&content, "/srv/p.xml").unwrap()
    }

    #[test]
    fn test_restricted_group_expands_to_transitive_leaves() {
        let doc = doc_with("<value>Internal</value>", "false");
        let restricted = doc.restricted_layers();
        assert!(restricted.contains("Drafts"));
        assert!(restricted.contains("sec"), "short name preferred");
        assert!(!restricted.contains("Roads"), "outside the group");
        assert!(!restricted.contains("Basemap"));
        assert_eq!(restricted.len(), 2);
    }

    #[test]
    fn test_restricted_plain_layer_name() {
        let doc = doc_with("<value>Roads</value>", "false");
        assert_eq!(
            doc.restricted_layers(),
            &HashSet::from(["Roads".to_string()])
        );
    }

    #[test]
    fn test_restricted_identifier_form_follows_use_layer_ids() {
        let doc = doc_with("<value>Internal</value>", "true");
        let restricted = doc.restricted_layers();
        assert!(restricted.contains("drafts1"));
        assert!(restricted.contains("secrets1"));
    }

    #[test]
    fn test_legend_groups_are_annotated_from_layer_tree() {
        let content = "<qgis>\
            <layer-tree-group>\
            <layer-tree-group name=\"Hydro\">\
            <customproperties>\
            <property key=\"wmsShortName\" value=\"hy\"/>\
            <property key=\"wmsTitle\" value=\"Hydrology\"/>\
            </customproperties>\
            <layer-tree-group name=\"Lakes\"/>\
            </layer-tree-group>\
            </layer-tree-group>\
            <legend>\
            <legendgroup name=\"Hydro\">\
            <legendgroup name=\"Lakes\"/>\
            </legendgroup>\
            <legendgroup name=\"Orphan\"/>\
            </legend>\
            </qgis>";
        let doc = ProjectDocument::from_str(content, "/srv/p.xml").unwrap();

        let groups = doc.legend_groups();
        let names: Vec<&str> = groups
            .iter()
            .map(|g| g.attribute("name").unwrap())
            .collect();
        // Children before their parent; the orphan is still emitted.
        assert_eq!(names, vec!["Lakes", "Hydro", "Orphan"]);

        let hydro = &groups[1];
        assert_eq!(hydro.attribute("shortName"), Some("hy"));
        assert_eq!(hydro.attribute("title"), Some("Hydrology"));

        let orphan = &groups[2];
        assert_eq!(orphan.attribute("shortName"), None, "unmatched: unannotated");
    }

    #[test]
    fn test_legend_walk_tolerates_interleaved_layers() {
        // The legend has a non-group sibling before the group; the matching
        // index must still find the layer-tree counterpart.
        let content = "<qgis>\
            <layer-tree-group>\
            <layer-tree-layer name=\"Roads\" id=\"roads1\"/>\
            <layer-tree-group name=\"G\">\
            <customproperties><property key=\"wmsShortName\" value=\"g\"/></customproperties>\
            </layer-tree-group>\
            </layer-tree-group>\
            <legend>\
            <legendlayer name=\"Roads\"/>\
            <legendgroup name=\"G\"/>\
            </legend>\
            </qgis>";
        let doc = ProjectDocument::from_str(content, "/srv/p.xml").unwrap();
        let groups = doc.legend_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].attribute("shortName"), Some("g"));
    }

    #[test]
    fn test_distinct_groups_sharing_a_name_are_both_emitted() {
        // The nested "A" under the unmatched "B" is a different group than
        // the matched top-level "A"; both must come out.
        let content = "<qgis>\
            <layer-tree-group>\
            <layer-tree-group name=\"A\"/>\
            </layer-tree-group>\
            <legend>\
            <legendgroup name=\"A\"/>\
            <legendgroup name=\"B\">\
            <legendgroup name=\"A\"/>\
            </legendgroup>\
            </legend>\
            </qgis>";
        let doc = ProjectDocument::from_str(content, "/srv/p.xml").unwrap();

        let names: Vec<&str> = doc
            .legend_groups()
            .iter()
            .map(|g| g.attribute("name").unwrap())
            .collect();
        assert_eq!(
            names.iter().filter(|n| **n == "A").count(),
            2,
            "both groups named A must be emitted: {names:?}"
        );
        assert_eq!(names.iter().filter(|n| **n == "B").count(), 1);
    }

    #[test]
    fn test_layer_id_from_legend_layer() {
        let el = parse_document(
            "<legendlayer name=\"Roads\"><filegroup><legendlayerfile layerid=\"roads1\"/></filegroup></legendlayer>",
        )
        .unwrap();
        assert_eq!(layer_id_from_legend_layer(&el).as_deref(), Some("roads1"));
        let empty = parse_document("<legendlayer/>").unwrap();
        assert_eq!(layer_id_from_legend_layer(&empty), None);
    }

    #[test]
    fn test_sublayers_of_embedded_group_missing_file_is_empty() {
        let set = sublayers_of_embedded_group(Path::new("/nonexistent/p.xml"), "G");
        assert!(set.is_empty());
    }

    #[test]
    fn test_sublayers_of_embedded_group_collects_transitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.xml");
        std::fs::write(
            &path,
            "<qgis><legend>\
             <legendgroup name=\"G\">\
             <legendgroup name=\"Sub\">\
             <legendlayer name=\"Deep\"/>\
             </legendgroup>\
             <legendlayer name=\"Direct\"/>\
             </legendgroup>\
             <legendgroup name=\"Other\"><legendlayer name=\"Not me\"/></legendgroup>\
             </legend></qgis>",
        )
        .unwrap();

        let set = sublayers_of_embedded_group(&path, "G");
        assert_eq!(
            set,
            HashSet::from([
                "Sub".to_string(),
                "Deep".to_string(),
                "Direct".to_string()
            ])
        );
    }
}
