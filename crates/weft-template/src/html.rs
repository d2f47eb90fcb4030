//! HTML vocabulary: void elements, inline elements, and the whitelist of
//! URL-bearing tag/attribute pairs.

use std::collections::{HashMap, HashSet};

/// Void elements never take children and are emitted without a closing tag.
/// <https://html.spec.whatwg.org/multipage/syntax.html#void-elements>
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Inline elements do not get indent breaks inserted around them when
/// pretty-printing, to avoid introducing visible whitespace.
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "bdo", "big", "br", "button", "cite", "code", "dfn", "em", "i",
    "img", "input", "kbd", "label", "map", "object", "q", "samp", "select", "small", "span",
    "strong", "sub", "sup", "textarea", "title", "tt", "var",
];

/// Tag/attribute pairs whose value is a URL, per the OWASP cheat sheet.
/// Parameters substituted into these are URI context, not plain attribute
/// context.
const URL_ATTRS: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("audio", "src"),
    ("base", "href"),
    ("blockquote", "cite"),
    ("body", "background"),
    ("button", "formaction"),
    ("command", "icon"),
    ("del", "cite"),
    ("embed", "src"),
    ("form", "action"),
    ("frame", "longdesc"),
    ("frame", "src"),
    ("head", "profile"),
    ("html", "manifest"),
    ("iframe", "longdesc"),
    ("iframe", "src"),
    ("img", "longdesc"),
    ("img", "src"),
    ("img", "usemap"),
    ("input", "formaction"),
    ("input", "src"),
    ("input", "usemap"),
    ("ins", "cite"),
    ("link", "href"),
    ("q", "cite"),
    ("script", "src"),
    ("source", "src"),
    ("video", "poster"),
    ("video", "src"),
];

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

pub(crate) fn is_inline_element(tag: &str) -> bool {
    INLINE_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// The URL-bearing attribute whitelist, extensible at runtime for custom
/// elements that take URL parameters.
#[derive(Clone, Debug)]
pub struct UrlAttrs {
    by_tag: HashMap<String, HashSet<String>>,
}

impl Default for UrlAttrs {
    fn default() -> Self {
        let mut by_tag: HashMap<String, HashSet<String>> = HashMap::new();
        for (tag, attr) in URL_ATTRS {
            by_tag
                .entry((*tag).to_owned())
                .or_default()
                .insert((*attr).to_owned());
        }
        Self { by_tag }
    }
}

impl UrlAttrs {
    /// Register a custom tag/attribute pair as URL-bearing.
    pub fn add(&mut self, tag: &str, attr: &str) {
        self.by_tag
            .entry(tag.to_ascii_lowercase())
            .or_default()
            .insert(attr.to_ascii_lowercase());
    }

    /// True if `attr` on `tag` takes a URL value. Case-insensitive.
    #[must_use]
    pub fn is_url_attr(&self, tag: &str, attr: &str) -> bool {
        self.by_tag
            .get(&tag.to_ascii_lowercase())
            .is_some_and(|attrs| attrs.contains(&attr.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_and_inline() {
        assert!(is_void_element("br"));
        assert!(is_void_element("IMG"));
        assert!(!is_void_element("div"));
        assert!(is_inline_element("span"));
        assert!(!is_inline_element("p"));
    }

    #[test]
    fn test_url_attrs_default_table() {
        let attrs = UrlAttrs::default();
        assert!(attrs.is_url_attr("a", "href"));
        assert!(attrs.is_url_attr("A", "HREF"));
        assert!(attrs.is_url_attr("form", "action"));
        assert!(!attrs.is_url_attr("a", "title"));
        assert!(!attrs.is_url_attr("div", "href"));
    }

    #[test]
    fn test_url_attrs_custom_registration() {
        let mut attrs = UrlAttrs::default();
        assert!(!attrs.is_url_attr("my-widget", "data-src"));
        attrs.add("my-widget", "data-src");
        assert!(attrs.is_url_attr("My-Widget", "data-src"));
    }
}
