//! Owned element tree for project documents.
//!
//! Project documents are parsed once, event-wise, into an owned [`Element`]
//! tree. Navigation mirrors the DOM calls the rest of the crate needs
//! (`first_child_element`, `elements_by_tag_name`, concatenated `text`),
//! so no other module touches the XML parser.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors raised while parsing a document into an element tree.
#[derive(Debug, Error)]
pub enum DomError {
    /// Malformed XML input
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    /// Malformed attribute syntax
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),

    /// Document contained no root element
    #[error("document has no root element")]
    NoRootElement,
}

/// A child node of an element: either a nested element or a text run.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element of the parsed document tree.
///
/// Attribute order is preserved as written in the source document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element with the given tag name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tag name of this element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or replace) an attribute value.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    /// Append a child node.
    pub fn push_child(&mut self, node: Node) {
        self.children.push(node);
    }

    /// All child nodes, in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order, skipping text runs.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with the given tag name.
    pub fn first_child_element(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    /// Mutable access to the first direct child element with the given name.
    pub fn first_child_element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// All descendant elements with the given tag name, in document order.
    ///
    /// The receiver itself is not included, matching DOM semantics.
    pub fn elements_by_tag_name<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.collect_by_tag_name(name, &mut out);
        out
    }

    fn collect_by_tag_name<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for el in self.child_elements() {
            if el.name == name {
                out.push(el);
            }
            el.collect_by_tag_name(name, out);
        }
    }

    /// Concatenated text of this element and all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Replace the element's content with a single text run.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(Node::Text(text.into()));
    }

    /// Serialize the subtree back to XML text.
    ///
    /// Used for expression scans over a definition's full content; the
    /// output is not required to round-trip formatting. Apostrophes are
    /// kept literal so `getFeature('…')` expressions read back as written.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            // Attribute values are double-quoted, so only the quote itself
            // needs escaping beyond the markup characters.
            out.push_str(&quick_xml::escape::partial_escape(v.as_str()).replace('"', "&quot;"));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(&quick_xml::escape::partial_escape(t.as_str())),
                Node::Element(el) => el.write_xml(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Parse an XML document and return its root element.
pub fn parse_document(input: &str) -> Result<Element, DomError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let el = element_from_start(&start)?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(text) => {
                let value = text.unescape()?.into_owned();
                if !value.is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(Node::Text(value));
                    }
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.push_child(Node::Text(value));
                }
            }
            Event::End(_) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no
            // layer information.
            _ => {}
        }
    }

    root.ok_or(DomError::NoRootElement)
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element, DomError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(Node::Element(el)),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let root = parse_document(
            "<qgis version=\"1.3.0\"><title>Demo</title><properties><WMSUseLayerIDs type=\"bool\">true</WMSUseLayerIDs></properties></qgis>",
        )
        .unwrap();

        assert_eq!(root.name(), "qgis");
        assert_eq!(root.attribute("version"), Some("1.3.0"));
        assert_eq!(root.first_child_element("title").unwrap().text(), "Demo");

        let props = root.first_child_element("properties").unwrap();
        let flag = props.first_child_element("WMSUseLayerIDs").unwrap();
        assert_eq!(flag.attribute("type"), Some("bool"));
        assert_eq!(flag.text(), "true");
    }

    #[test]
    fn test_elements_by_tag_name_is_recursive() {
        let root = parse_document(
            "<legend><legendgroup name=\"a\"><legendgroup name=\"b\"/></legendgroup><legendlayer name=\"l\"/></legend>",
        )
        .unwrap();

        let groups = root.elements_by_tag_name("legendgroup");
        assert_eq!(groups.len(), 2, "nested groups must be collected");
        assert_eq!(groups[0].attribute("name"), Some("a"));
        assert_eq!(groups[1].attribute("name"), Some("b"));
    }

    #[test]
    fn test_text_concatenates_descendants() {
        let root = parse_document("<a>x<b>y</b>z</a>").unwrap();
        assert_eq!(root.text(), "xyz");
    }

    #[test]
    fn test_set_text_replaces_content() {
        let mut root = parse_document("<datasource>./data/a.shp</datasource>").unwrap();
        root.set_text("/abs/data/a.shp");
        assert_eq!(root.text(), "/abs/data/a.shp");
    }

    #[test]
    fn test_no_root_element_is_an_error() {
        assert!(matches!(
            parse_document("   "),
            Err(DomError::NoRootElement)
        ));
    }

    #[test]
    fn test_serialization_escapes_attribute_values() {
        let mut el = Element::new("join");
        el.set_attribute("expr", "a < b");
        assert_eq!(el.to_xml_string(), "<join expr=\"a &lt; b\"/>");
    }

    #[test]
    fn test_serialization_keeps_apostrophes_literal() {
        let root = parse_document(
            "<maplayer><expression>getFeature('Lookup', 'k', 1)</expression></maplayer>",
        )
        .unwrap();
        let text = root.to_xml_string();
        assert!(
            text.contains("getFeature('Lookup'"),
            "expression text must read back as written: {text}"
        );

        let mut el = Element::new("config");
        el.set_attribute("FilterExpression", "getFeature('Lut', \"k\", 1)");
        let text = el.to_xml_string();
        assert!(text.contains("getFeature('Lut'"), "attributes too: {text}");
        assert!(text.contains("&quot;"), "quotes still escaped: {text}");
    }
}
