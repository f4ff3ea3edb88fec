//! Content block enumeration.
//!
//! The countable sequence a position refers to is the container's element
//! children minus anything a reader cannot see: non-rendered tags
//! (`script`, `style`, `noscript`, `template`) and "empty" blocks. A block is
//! empty when its rendered text is blank (whitespace and non-breaking spaces
//! only) and nothing at or below it is embedded media.

use crate::dom::{Document, NodeId, TagClass, tag_class};

/// Countable content blocks of `container`, in document order.
pub fn block_elements(doc: &Document, container: NodeId) -> Vec<NodeId> {
    doc.element_children(container).into_iter().filter(|&child| is_countable(doc, child)).collect()
}

/// Whether a single element child counts as a content block.
pub fn is_countable(doc: &Document, node: NodeId) -> bool {
    let Some(name) = doc.tag_name(node) else {
        return false;
    };
    if tag_class(name).contains(TagClass::NON_RENDERED) {
        return false;
    }
    !is_blank(&doc.text_content(node)) || contains_media(doc, node)
}

fn contains_media(doc: &Document, node: NodeId) -> bool {
    doc.descendants(node)
        .into_iter()
        .filter_map(|id| doc.tag_name(id))
        .any(|name| tag_class(name).contains(TagClass::MEDIA))
}

fn is_blank(text: &str) -> bool {
    text.trim_matches(is_space).is_empty()
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{a0}'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(html: &str) -> Vec<String> {
        let doc = Document::parse(html);
        let container = doc.query(".c").unwrap().unwrap();
        block_elements(&doc, container)
            .into_iter()
            .map(|id| {
                let name = doc.tag_name(id).unwrap_or_default();
                match doc.attr(id, "id") {
                    Some(tag) => format!("{name}#{tag}"),
                    None => name.to_string(),
                }
            })
            .collect()
    }

    #[test]
    fn drops_non_rendered_and_empty_blocks() {
        let cases = vec![
            ("<div class=\"c\"><p>a</p><script>x()</script><p>b</p></div>", vec!["p", "p"]),
            ("<div class=\"c\"><p> </p><p>&nbsp;</p><p>&#160;&#xa0;\u{a0}</p><p id=\"k\">kept</p></div>", vec!["p#k"]),
            ("<div class=\"c\"><style>p{}</style><noscript>enable js</noscript><h2>t</h2></div>", vec!["h2"]),
            ("<div class=\"c\"><p><script>only()</script></p><hr><br></div>", vec![]),
            ("<div class=\"c\">loose text<p>a</p><!-- c --></div>", vec!["p"]),
        ];
        for (html, expected) in cases {
            assert_eq!(names(html), expected, "{html}");
        }
    }

    #[test]
    fn media_counts_without_text() {
        let html = "<div class=\"c\"><figure><img src=\"a.png\"></figure><p></p><iframe src=\"v\"></iframe><img id=\"i\" src=\"b.png\"></div>";
        assert_eq!(names(html), vec!["figure", "iframe", "img#i"]);
    }

    #[test]
    fn only_direct_children_count() {
        assert_eq!(names("<div class=\"c\"><section><p>a</p><p>b</p></section></div>"), vec!["section"]);
    }
}
