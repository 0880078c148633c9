//! Target element lookup
//!
//! Finds the first element (document order) whose local name matches, ignoring
//! namespace prefixes, and reports its leading text together with where that text
//! sits in the parsed source.

use std::ops::Range;

use roxmltree::Document;

/// Leading text of the located element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementText<'a> {
    /// Decoded text, entities resolved
    pub text: &'a str,
    /// The same text exactly as it appears in the source, CDATA markers included
    pub raw: &'a str,
    /// Byte range of `raw` in the parsed source
    pub range: Range<usize>,
}

/// Result of looking up the target element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located<'a> {
    /// No element with that name exists
    Absent,
    /// The element exists but its text is empty or whitespace only
    EmptyOrWhitespace,
    /// The element has non-blank text
    Present(ElementText<'a>),
}

impl Located<'_> {
    pub fn kind(&self) -> LocateKind {
        match self {
            Located::Absent => LocateKind::Absent,
            Located::EmptyOrWhitespace => LocateKind::EmptyOrWhitespace,
            Located::Present(_) => LocateKind::Present,
        }
    }
}

/// Lifetime-free view of [`Located`] for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocateKind {
    Absent,
    EmptyOrWhitespace,
    Present,
}

/// Locate `target` in `doc`; a missing element is a normal result, not an error
pub fn locate<'a>(doc: &'a Document<'_>, target: &str) -> Located<'a> {
    let Some(element) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == target)
    else {
        return Located::Absent;
    };

    let Some(text_node) = element.first_child().filter(|child| child.is_text()) else {
        return Located::EmptyOrWhitespace;
    };
    let text = text_node.text().unwrap_or_default();
    if text.trim().is_empty() {
        return Located::EmptyOrWhitespace;
    }

    // adjacent text and CDATA sections are merged into one node whose own range
    // only covers the first segment; the text really runs up to the next node
    let input = doc.input_text();
    let start = text_node.range().start;
    let end = match text_node.next_sibling() {
        Some(next) => next.range().start,
        None => input[..element.range().end]
            .rfind("</")
            .unwrap_or(text_node.range().end),
    };
    let range = start..end;
    match input.get(range.clone()) {
        Some(raw) => Located::Present(ElementText { text, raw, range }),
        None => Located::EmptyOrWhitespace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::XmlParser;

    fn with_doc<T>(xml: &str, f: impl FnOnce(&Document<'_>) -> T) -> T {
        let doc = XmlParser::new().parse(xml).unwrap();
        f(&doc)
    }

    #[test]
    fn test_present() {
        let xml = "<root><xTexto>PreÇo É Caro É</xTexto></root>";
        with_doc(xml, |doc| match locate(doc, "xTexto") {
            Located::Present(found) => {
                assert_eq!(found.text, "PreÇo É Caro É");
                assert_eq!(found.raw, "PreÇo É Caro É");
                assert_eq!(&xml[found.range.clone()], "PreÇo É Caro É");
            }
            other => panic!("Expected Present, got {:?}", other),
        });
    }

    #[test]
    fn test_absent() {
        with_doc("<root><other>x</other></root>", |doc| {
            assert_eq!(locate(doc, "xTexto"), Located::Absent);
            assert_eq!(locate(doc, "xTexto").kind(), LocateKind::Absent);
        });
    }

    #[test]
    fn test_empty_and_whitespace() {
        with_doc("<root><xTexto/></root>", |doc| {
            assert_eq!(locate(doc, "xTexto"), Located::EmptyOrWhitespace);
        });
        with_doc("<root><xTexto>  \n\t </xTexto></root>", |doc| {
            assert_eq!(locate(doc, "xTexto"), Located::EmptyOrWhitespace);
        });
    }

    #[test]
    fn test_element_child_first_is_empty() {
        with_doc("<root><xTexto><b>bold</b> tail</xTexto></root>", |doc| {
            assert_eq!(locate(doc, "xTexto").kind(), LocateKind::EmptyOrWhitespace);
        });
    }

    #[test]
    fn test_first_match_only() {
        with_doc(
            "<root><xTexto>first</xTexto><xTexto>second É</xTexto></root>",
            |doc| match locate(doc, "xTexto") {
                Located::Present(found) => assert_eq!(found.text, "first"),
                other => panic!("Expected Present, got {:?}", other),
            },
        );
    }

    #[test]
    fn test_namespace_ignored() {
        let xml = r#"<nfe:root xmlns:nfe="http://www.portalfiscal.inf.br/nfe"><nfe:xTexto>ok</nfe:xTexto></nfe:root>"#;
        with_doc(xml, |doc| {
            assert_eq!(locate(doc, "xTexto").kind(), LocateKind::Present);
        });
    }

    #[test]
    fn test_entities_decoded_but_raw_kept() {
        let xml = "<root><xTexto>A &amp; É</xTexto></root>";
        with_doc(xml, |doc| match locate(doc, "xTexto") {
            Located::Present(found) => {
                assert_eq!(found.text, "A & É");
                assert_eq!(found.raw, "A &amp; É");
            }
            other => panic!("Expected Present, got {:?}", other),
        });
    }

    #[test]
    fn test_cdata_segments_are_one_span() {
        let xml = "<r><xTexto>A É<![CDATA[ É]]> B É</xTexto></r>";
        with_doc(xml, |doc| match locate(doc, "xTexto") {
            Located::Present(found) => {
                assert_eq!(found.text, "A É É B É");
                assert_eq!(found.raw, "A É<![CDATA[ É]]> B É");
                assert_eq!(&xml[found.range.clone()], found.raw);
            }
            other => panic!("Expected Present, got {:?}", other),
        });
    }

    #[test]
    fn test_text_stops_at_comment() {
        let xml = "<r><xTexto>É<!-- nota -->tail</xTexto></r>";
        with_doc(xml, |doc| match locate(doc, "xTexto") {
            Located::Present(found) => {
                assert_eq!(found.text, "É");
                assert_eq!(found.raw, "É");
            }
            other => panic!("Expected Present, got {:?}", other),
        });
    }
}
