//! Document tree adapter.
//!
//! The orchestrator needs a live document it can query with a selector,
//! enumerate, and splice a node into. Parsing, selector matching and
//! serialization are html5ever's (through `scraper`); this module only adds
//! the small id-based API the engine works with.
//!
//! ```text
//! Document { html: scraper::Html, root }
//!              │            └─ NodeId whose children are the input's top-level nodes
//!              └─ tree: ego_tree::Tree<scraper::Node>
//! ```
//!
//! Input that looks like a full page (doctype, `<html>`, `<head>` or `<body>`)
//! is parsed as a document; anything else as a body fragment, and serializes
//! back as a fragment. Nodes detached from the tree stay allocated but are
//! unreachable.

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};
use std::fmt;
use thiserror::Error;

pub use ego_tree::NodeId;

bitflags::bitflags! {
    /// Static classification of tag names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TagClass: u8 {
        /// Never contributes visible content (script, style, ...).
        const NON_RENDERED = 1 << 0;
        /// Embedded media; counts as content even without text.
        const MEDIA        = 1 << 1;
    }
}

/// Classify a lowercase tag name.
pub fn tag_class(name: &str) -> TagClass {
    match name {
        "script" | "style" | "noscript" | "template" => TagClass::NON_RENDERED,
        "img" | "embed" | "picture" | "video" | "audio" | "iframe" | "object" | "svg" | "canvas" => TagClass::MEDIA,
        _ => TagClass::empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// Parse a CSS selector list.
pub fn parse_selector(src: &str) -> Result<Selector, SelectorError> {
    Selector::parse(src).map_err(|err| SelectorError { selector: src.to_string(), reason: err.to_string() })
}

/// Escape text for use inside a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

pub struct Document {
    html: Html,
    root: NodeId,
    fragment: bool,
}

impl Document {
    /// Parse an HTML document or fragment. Never fails; malformed markup is
    /// recovered from the way browsers do.
    pub fn parse(html: &str) -> Self {
        let page = regex!(r"(?i)<!doctype|<html[\s>]|<head[\s>]|<body[\s>]").is_match(html);
        if page {
            let parsed = Html::parse_document(html);
            let root = parsed.tree.root().id();
            Document { html: parsed, root, fragment: false }
        } else {
            let parsed = Html::parse_fragment(html);
            let root = parsed.root_element().id();
            Document { html: parsed, root, fragment: true }
        }
    }

    /// Parent of the input's top-level nodes.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent().map(|p| p.id())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children().map(|c| c.id()).collect()).unwrap_or_default()
    }

    /// Element children only (the `children` of the DOM, not `childNodes`).
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children().filter(|c| c.value().is_element()).map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.value().is_element())
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value().as_element().map(|e| e.name())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.value().as_element()?.attr(name)
    }

    /// `id` and every node below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.descendants().map(|d| d.id()).collect()).unwrap_or_default()
    }

    /// Rendered text below `id`: text inside non-rendered elements is left out.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let mut text = String::new();
        for d in node.descendants() {
            let Some(t) = d.value().as_text() else { continue };
            let hidden = d.ancestors().take_while(|a| a.id() != id).chain(std::iter::once(node)).any(|a| {
                a.value().as_element().is_some_and(|e| tag_class(e.name()).contains(TagClass::NON_RENDERED))
            });
            if !hidden {
                text.push_str(t);
            }
        }
        text
    }

    /// Every text node below `id`, including script and style bodies.
    pub fn raw_text(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| n.descendants().filter_map(|d| d.value().as_text().map(|t| &**t)).collect())
            .unwrap_or_default()
    }

    /// First element in document order matching `selector`.
    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        self.html.select(selector).next().map(|e| e.id())
    }

    /// Convenience wrapper parsing `selector` first.
    pub fn query(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let parsed = parse_selector(selector)?;
        Ok(self.select_first(&parsed))
    }

    /// Parse `markup` and copy its first top-level element into this tree,
    /// detached. `None` when the markup holds no element.
    pub fn build_element(&mut self, markup: &str) -> Option<NodeId> {
        let fragment = Html::parse_fragment(markup);
        let source = fragment.root_element().children().find(|c| c.value().is_element())?;
        Some(self.graft(source))
    }

    /// Parse `markup` and append copies of its top-level nodes to `parent`.
    /// Returns the ids of the copies.
    pub fn append_fragment(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(markup);
        let mut top = Vec::new();
        for source in fragment.root_element().children() {
            let copy = self.graft(source);
            self.append_child(parent, copy);
            top.push(copy);
        }
        top
    }

    /// Deep-copy `source` from another tree as a detached subtree.
    fn graft(&mut self, source: NodeRef<'_, Node>) -> NodeId {
        let root = self.html.tree.orphan(source.value().clone()).id();
        // (source node, destination parent)
        let mut stack: Vec<_> = source.children().rev().map(|c| (c, root)).collect();
        while let Some((src, parent)) = stack.pop() {
            let Some(mut dst) = self.html.tree.get_mut(parent) else { continue };
            let copy = dst.append(src.value().clone()).id();
            stack.extend(src.children().rev().map(|c| (c, copy)));
        }
        root
    }

    /// Unlink `id` from its parent.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.append_id(child);
        }
    }

    /// Insert `node` as the previous sibling of `reference`. Does nothing when
    /// `reference` has no parent.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        if reference == node || self.parent(reference).is_none() {
            return;
        }
        if let Some(mut anchor) = self.html.tree.get_mut(reference) {
            anchor.insert_id_before(node);
        }
    }

    /// Insert `node` as the next sibling of `reference`. Does nothing when
    /// `reference` has no parent.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        if reference == node || self.parent(reference).is_none() {
            return;
        }
        if let Some(mut anchor) = self.html.tree.get_mut(reference) {
            anchor.insert_id_after(node);
        }
    }

    /// Serialize the whole document (or fragment).
    pub fn to_html(&self) -> String {
        if self.fragment {
            self.node(self.root).and_then(ElementRef::wrap).map(|e| e.inner_html()).unwrap_or_default()
        } else {
            self.html.html()
        }
    }

    /// Serialize a single element, tags included.
    pub fn outer_html(&self, id: NodeId) -> Option<String> {
        self.node(id).and_then(ElementRef::wrap).map(|e| e.html())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("fragment", &self.fragment)
            .field("nodes", &self.descendants(self.root).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tags() {
        assert!(tag_class("script").contains(TagClass::NON_RENDERED));
        assert!(tag_class("img").contains(TagClass::MEDIA));
        assert!(tag_class("p").is_empty());
    }

    #[test]
    fn fragments_round_trip_as_fragments() {
        let doc = Document::parse("<div id=\"c\"><p>a</p><p>b &amp; c</p></div>");
        assert!(doc.is_fragment());
        assert_eq!(doc.to_html(), "<div id=\"c\"><p>a</p><p>b &amp; c</p></div>");

        let page = Document::parse("<!DOCTYPE html><html><body><p>a</p></body></html>");
        assert!(!page.is_fragment());
        assert_eq!(page.to_html(), "<!DOCTYPE html><html><head></head><body><p>a</p></body></html>");
    }

    #[test]
    fn implied_end_tags_follow_html_rules() {
        let doc = Document::parse("<div class=\"c\"><p>one<p>two<ul><li>a<li>b</ul></div>");
        let container = doc.query(".c").unwrap().unwrap();
        let names: Vec<_> = doc.element_children(container).into_iter().filter_map(|id| doc.tag_name(id)).collect();
        assert_eq!(names, vec!["p", "p", "ul"]);

        let list = doc.query("ul").unwrap().unwrap();
        assert_eq!(doc.element_children(list).len(), 2);
    }

    #[test]
    fn splice_and_serialize() {
        let mut doc = Document::parse("<div id=\"c\"><p>a</p><p>b</p></div>");
        let container = doc.query("#c").unwrap().unwrap();
        let second = doc.element_children(container)[1];

        let aside = doc.build_element("<aside class=\"x\"></aside>").unwrap();
        doc.append_fragment(aside, "hi <b>there</b>");
        doc.insert_before(second, aside);
        assert_eq!(doc.to_html(), "<div id=\"c\"><p>a</p><aside class=\"x\">hi <b>there</b></aside><p>b</p></div>");

        let tail = doc.build_element("<hr>").unwrap();
        doc.insert_after(second, tail);
        assert_eq!(doc.outer_html(container).unwrap(), doc.to_html());
        assert!(doc.to_html().ends_with("<p>b</p><hr></div>"));
    }

    #[test]
    fn selectors_come_from_the_parser() {
        let doc = Document::parse("<main><article><div class=\"content\"><p>x</p></div></article></main>");
        assert!(doc.query("article > .content").unwrap().is_some());
        assert!(doc.query("main .content p:first-child").unwrap().is_some());
        assert!(doc.query("[data-missing]").unwrap().is_none());
        assert!(doc.query("div >").is_err());
        assert!(doc.query("").is_err());
    }

    #[test]
    fn text_content_skips_scripts() {
        let doc = Document::parse("<div><script>var a = 1;</script> <p>Hello</p></div>");
        let div = doc.query("div").unwrap().unwrap();
        assert_eq!(doc.text_content(div).trim(), "Hello");
        assert!(doc.raw_text(div).contains("var a = 1;"));
    }

    #[test]
    fn entities_are_decoded() {
        let doc = Document::parse("<p>&nbsp;&#160;</p>");
        let p = doc.query("p").unwrap().unwrap();
        assert_eq!(doc.text_content(p), "\u{a0}\u{a0}");
    }

    #[test]
    fn attribute_escaping() {
        assert_eq!(escape_attr(r#"a"b<&>"#), "a&quot;b&lt;&amp;&gt;");
    }
}
