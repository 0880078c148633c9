//! Strict XML parsing
//!
//! Well-formedness is decided by `roxmltree`. A document type declaration is
//! accepted only when it neither declares entities nor points at an external
//! subset, so nothing is ever expanded or loaded from outside the file. The
//! parser only reports pass/fail and never tries to fix anything.
//!
//! Input bytes are decoded with the encoding named in the XML declaration
//! (UTF-8 when there is none); [`SourceText::encode`] turns rewritten text back
//! into the same encoding.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use roxmltree::{Document, ParsingOptions};

use crate::error::ParseFailure;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Upper bound on nodes per document; real inputs are small single records
const NODES_LIMIT: u32 = 4_000_000;

static DECLARED_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml\s[^>]*?encoding\s*=\s*["']([A-Za-z][A-Za-z0-9._\-]*)["']"#)
        .expect("valid regex")
});

/// A document's bytes split into an optional BOM and the decoded body that gets parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText<'a> {
    pub bom: &'a [u8],
    pub body: Cow<'a, str>,
    pub encoding: &'static Encoding,
}

impl SourceText<'_> {
    /// Encode `text` the way the source was stored: same BOM, same encoding.
    ///
    /// Characters the encoding cannot represent become numeric character
    /// references.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.bom.len() + text.len());
        bytes.extend_from_slice(self.bom);
        if self.encoding == UTF_8 {
            bytes.extend_from_slice(text.as_bytes());
        } else {
            let (encoded, _, _) = self.encoding.encode(text);
            bytes.extend_from_slice(&encoded);
        }
        bytes
    }
}

/// Security-hardened strict parser
#[derive(Debug, Clone, Copy)]
pub struct XmlParser {
    nodes_limit: u32,
}

impl XmlParser {
    pub fn new() -> Self {
        Self {
            nodes_limit: NODES_LIMIT,
        }
    }

    /// Split off a UTF-8 BOM and decode the rest with the declared encoding
    pub fn decode<'a>(&self, raw: &'a [u8]) -> Result<SourceText<'a>, ParseFailure> {
        let (bom, body) = match raw.strip_prefix(UTF8_BOM) {
            Some(rest) => (&raw[..UTF8_BOM.len()], rest),
            None => (&raw[..0], raw),
        };

        // a UTF-8 BOM overrides whatever the declaration says
        let encoding = match declared_encoding(body) {
            Some(label) if bom.is_empty() => {
                Encoding::for_label(label).ok_or_else(|| {
                    ParseFailure::new(format!(
                        "unsupported encoding '{}'",
                        String::from_utf8_lossy(label)
                    ))
                })?
            }
            _ => UTF_8,
        };
        // UTF-16 and the replacement encoding cannot be written back as declared
        if encoding.output_encoding() != encoding {
            return Err(ParseFailure::new(format!(
                "unsupported encoding '{}'",
                encoding.name()
            )));
        }

        let body = if encoding == UTF_8 {
            Cow::Borrowed(std::str::from_utf8(body).map_err(|e| {
                ParseFailure::new(format!(
                    "invalid UTF-8 at byte {}",
                    bom.len() + e.valid_up_to()
                ))
            })?)
        } else {
            encoding
                .decode_without_bom_handling_and_without_replacement(body)
                .ok_or_else(|| {
                    ParseFailure::new(format!("invalid {} byte sequence", encoding.name()))
                })?
        };

        Ok(SourceText {
            bom,
            body,
            encoding,
        })
    }

    /// Parse text into a navigable tree
    pub fn parse<'a>(&self, text: &'a str) -> Result<Document<'a>, ParseFailure> {
        if let Some(reason) = unsafe_doctype(text) {
            return Err(ParseFailure::new(reason));
        }

        let options = ParsingOptions {
            allow_dtd: true,
            nodes_limit: self.nodes_limit,
            ..ParsingOptions::default()
        };
        Document::parse_with_options(text, options)
            .map_err(|e| ParseFailure::new(e.to_string()))
    }

    /// Whether `text` is well-formed, discarding the tree
    pub fn check(&self, text: &str) -> Result<(), ParseFailure> {
        self.parse(text).map(|_| ())
    }
}

impl Default for XmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn declared_encoding(body: &[u8]) -> Option<&[u8]> {
    DECLARED_ENCODING
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_bytes())
}

/// Why the prolog's DOCTYPE is refused, if it is.
///
/// Only the prolog is scanned: declaration, comments and processing
/// instructions are skipped until the DOCTYPE or the root element shows up.
fn unsafe_doctype(text: &str) -> Option<&'static str> {
    let mut rest = text.trim_start_matches('\u{FEFF}');
    loop {
        rest = rest.trim_start();
        if rest.starts_with("<?") {
            rest = &rest[rest.find("?>")? + 2..];
        } else if rest.starts_with("<!--") {
            rest = &rest[rest.find("-->")? + 3..];
        } else if rest.starts_with("<!DOCTYPE") {
            break;
        } else {
            return None;
        }
    }

    let header_end = rest.find(['[', '>']).unwrap_or(rest.len());
    let header = &rest[..header_end];
    if header.contains("SYSTEM") || header.contains("PUBLIC") {
        return Some("DTD references an external subset");
    }

    if rest[header_end..].starts_with('[') {
        let subset_end = rest.find("]>").unwrap_or(rest.len());
        if rest[header_end..subset_end].contains("<!ENTITY") {
            return Some("DTD declares entities");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_bytes(raw: &[u8]) -> Result<(), ParseFailure> {
        let parser = XmlParser::new();
        let source = parser.decode(raw)?;
        parser.check(&source.body)
    }

    #[test]
    fn test_parse_well_formed() {
        let parser = XmlParser::new();
        let doc = parser
            .parse("<?xml version=\"1.0\"?><root><xTexto>abc</xTexto></root>")
            .unwrap();
        assert_eq!(doc.root_element().tag_name().name(), "root");
    }

    #[test]
    fn test_mismatched_tag_fails() {
        let failure = parse_bytes(b"<a><b>text</a></b>").unwrap_err();
        assert!(!failure.reason.is_empty());
    }

    #[test]
    fn test_unexpected_end_fails() {
        assert!(parse_bytes(b"<root><unclosed>").is_err());
    }

    #[test]
    fn test_bare_ampersand_fails() {
        assert!(parse_bytes(b"<root>Tom & Jerry</root>").is_err());
    }

    #[test]
    fn test_plain_doctype_accepted() {
        assert!(parse_bytes(b"<?xml version=\"1.0\"?>\n<!DOCTYPE NFe>\n<NFe/>").is_ok());
        assert!(
            parse_bytes(b"<!-- nota -->\n<!DOCTYPE NFe [<!ELEMENT NFe ANY>]>\n<NFe/>").is_ok()
        );
    }

    #[test]
    fn test_entity_declarations_rejected() {
        let xml = br#"<?xml version="1.0"?>
<!DOCTYPE lolz [<!ENTITY lol "lol"><!ENTITY lol2 "&lol;&lol;&lol;">]>
<lolz>&lol2;</lolz>"#;
        let failure = parse_bytes(xml).unwrap_err();
        assert_eq!(failure.reason, "DTD declares entities");
    }

    #[test]
    fn test_external_entity_rejected() {
        let xml = br#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<foo>&xxe;</foo>"#;
        assert!(parse_bytes(xml).is_err());
    }

    #[test]
    fn test_external_subset_rejected() {
        let xml = br#"<!DOCTYPE NFe SYSTEM "http://example.com/nfe.dtd"><NFe/>"#;
        let failure = parse_bytes(xml).unwrap_err();
        assert_eq!(failure.reason, "DTD references an external subset");
    }

    #[test]
    fn test_doctype_text_in_content_is_ignored() {
        let xml = b"<r><xTexto>&lt;!DOCTYPE x SYSTEM \"y\"&gt;</xTexto></r>";
        assert!(parse_bytes(xml).is_ok());
    }

    #[test]
    fn test_bom_is_split_off() {
        let parser = XmlParser::new();
        let raw = b"\xEF\xBB\xBF<root/>";
        let source = parser.decode(raw).unwrap();
        assert_eq!(source.bom, UTF8_BOM);
        assert_eq!(source.body, "<root/>");
        assert_eq!(source.encode("<root/>"), raw.to_vec());
    }

    #[test]
    fn test_declared_latin1_is_decoded_and_reencoded() {
        let parser = XmlParser::new();
        let raw = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r><xNome>JOS\xC9</xNome></r>";
        let source = parser.decode(raw).unwrap();

        assert_eq!(source.encoding.name(), "windows-1252");
        assert!(source.body.contains("JOSÉ"));
        assert!(parser.check(&source.body).is_ok());
        assert_eq!(source.encode(&source.body), raw.to_vec());
    }

    #[test]
    fn test_unmappable_characters_become_references() {
        let parser = XmlParser::new();
        let source = parser
            .decode(b"<?xml version='1.0' encoding='latin1'?><r/>")
            .unwrap();
        assert_eq!(source.encode("\u{3042}"), b"&#12354;".to_vec());
    }

    #[test]
    fn test_undeclared_invalid_utf8_fails() {
        // "Pre\xC7o" is latin-1, not UTF-8, and nothing says so
        let failure = parse_bytes(b"<root>Pre\xC7o</root>").unwrap_err();
        assert!(failure.reason.contains("invalid UTF-8"));
    }

    #[test]
    fn test_unknown_or_utf16_encoding_fails() {
        let failure = parse_bytes(b"<?xml version=\"1.0\" encoding=\"klingon\"?><r/>").unwrap_err();
        assert!(failure.reason.contains("unsupported encoding"));
        assert!(parse_bytes(b"<?xml version=\"1.0\" encoding=\"UTF-16\"?><r/>").is_err());
    }

    #[test]
    fn test_empty_input_fails() {
        let parser = XmlParser::new();
        assert!(parse_bytes(b"").is_err());
        assert!(parser.check("   ").is_err());
    }
}
