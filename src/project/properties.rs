//! Typed reads over a project's `properties` element.
//!
//! Project-level configuration lives as loosely typed child elements of the
//! `properties` node. These helpers give the rest of the crate typed access
//! with the permissive fallbacks the legacy format requires: a missing or
//! malformed entry is simply absent.

use crate::dom::Element;

/// A string property: the text of the named child element.
pub fn string_property(properties: &Element, key: &str) -> Option<String> {
    let text = properties.first_child_element(key)?.text();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// A boolean property. Both `true` and the legacy `1` spelling count.
pub fn bool_property(properties: &Element, key: &str) -> bool {
    match properties.first_child_element(key) {
        Some(el) => {
            let text = el.text();
            text.eq_ignore_ascii_case("true") || text == "1"
        }
        None => false,
    }
}

/// An integer property.
pub fn int_property(properties: &Element, key: &str) -> Option<i32> {
    properties.first_child_element(key)?.text().trim().parse().ok()
}

/// A string-list property: the text of every `value` descendant of the
/// named child element, in document order.
pub fn string_list_property(properties: &Element, key: &str) -> Vec<String> {
    match properties.first_child_element(key) {
        Some(el) => el
            .elements_by_tag_name("value")
            .iter()
            .map(|v| v.text())
            .collect(),
        None => Vec::new(),
    }
}
