//! Best-effort repair of malformed documents
//!
//! The repairer runs an ordered chain of strategies over the original bytes and
//! stops at the first candidate that passes strict parsing. Strategies are pure:
//! they only ever produce an in-memory candidate, the file on disk is untouched.
//!
//! Default chain:
//! 1. [`LenientReparse`]: libxml2 recovery mode, serialized back to UTF-8.
//! 2. [`TextualFixes`]: a fixed list of textual corrections, each applied once,
//!    followed by a single strict re-parse.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ParseFailure, RepairFailure};
use crate::libxml2::LibXml2Wrapper;
use crate::parser::XmlParser;

/// Which strategy produced a repaired document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum RepairMethod {
    /// libxml2 recovery mode rebuilt the tree
    Lenient,
    /// Manual textual corrections, listing the fixes that changed the text
    Textual { fixes: Vec<String> },
}

/// A repaired document that is known to be well-formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub content: String,
    pub method: RepairMethod,
}

/// One link of the repair chain: raw bytes in, candidate text out
pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a candidate document; the repairer checks well-formedness
    fn attempt(&self, raw: &[u8]) -> Result<(String, RepairMethod), String>;
}

/// Re-parse with libxml2 in recovery mode
pub struct LenientReparse {
    libxml2: LibXml2Wrapper,
}

impl LenientReparse {
    pub fn new() -> Self {
        Self {
            libxml2: LibXml2Wrapper::new(),
        }
    }
}

impl Default for LenientReparse {
    fn default() -> Self {
        Self::new()
    }
}

impl RepairStrategy for LenientReparse {
    fn name(&self) -> &'static str {
        "lenient-reparse"
    }

    fn attempt(&self, raw: &[u8]) -> Result<(String, RepairMethod), String> {
        self.libxml2
            .recover_to_string(raw)
            .map(|content| (content, RepairMethod::Lenient))
            .map_err(|e| e.to_string())
    }
}

/// A single textual correction
pub type TextFix = fn(&str) -> Cow<'_, str>;

/// Textual corrections in the order they are applied
pub const TEXT_FIXES: &[(&str, TextFix)] = &[
    ("strip-control-chars", strip_control_chars),
    ("escape-bare-ampersands", escape_bare_ampersands),
    ("close-unclosed-tags", close_unclosed_tags),
];

/// Apply [`TEXT_FIXES`] to the raw text
pub struct TextualFixes;

impl RepairStrategy for TextualFixes {
    fn name(&self) -> &'static str {
        "textual-fixes"
    }

    fn attempt(&self, raw: &[u8]) -> Result<(String, RepairMethod), String> {
        let text = std::str::from_utf8(raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw))
            .map_err(|e| format!("not UTF-8 text: {}", e))?;

        let mut current = text.to_string();
        let mut applied = Vec::new();
        for (name, fix) in TEXT_FIXES {
            let fixed = fix(&current).into_owned();
            if fixed != current {
                debug!(fix = name, "textual fix changed the document");
                applied.push(name.to_string());
                current = fixed;
            }
        }

        if applied.is_empty() {
            return Err("no textual fix applied".to_string());
        }
        Ok((current, RepairMethod::Textual { fixes: applied }))
    }
}

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("valid regex"));

static AMPERSANDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:amp|lt|gt|quot|apos|#[0-9]+|#x[0-9A-Fa-f]+);|&").expect("valid regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(/?)([A-Za-z_][A-Za-z0-9_.:\-]*)[^<>]*?(/?)>").expect("valid regex")
});

/// Remove characters that are never legal in XML 1.0
pub fn strip_control_chars(text: &str) -> Cow<'_, str> {
    CONTROL_CHARS.replace_all(text, "")
}

/// Escape `&` unless it starts a predefined entity or character reference
pub fn escape_bare_ampersands(text: &str) -> Cow<'_, str> {
    AMPERSANDS.replace_all(text, |caps: &Captures| {
        if &caps[0] == "&" {
            "&amp;".to_string()
        } else {
            caps[0].to_string()
        }
    })
}

/// Close elements left open, inferring the names from the open-tag stack.
///
/// A closing tag that names an outer open element first closes everything opened
/// inside it; elements still open at the end of input are closed in order.
pub fn close_unclosed_tags(text: &str) -> Cow<'_, str> {
    let mut stack: Vec<&str> = Vec::new();
    let mut out = String::new();
    let mut copied = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('<') {
        let start = cursor + offset;
        let rest = &text[start..];

        let skip = if rest.starts_with("<!--") {
            Some(rest.find("-->").map_or(rest.len(), |e| e + 3))
        } else if rest.starts_with("<![CDATA[") {
            Some(rest.find("]]>").map_or(rest.len(), |e| e + 3))
        } else if rest.starts_with("<?") {
            Some(rest.find("?>").map_or(rest.len(), |e| e + 2))
        } else if rest.starts_with("<!") {
            Some(rest.find('>').map_or(rest.len(), |e| e + 1))
        } else {
            None
        };
        if let Some(len) = skip {
            cursor = start + len;
            continue;
        }

        let Some(caps) = TAG.captures(rest) else {
            cursor = start + 1;
            continue;
        };
        let whole = caps.get(0).map_or(1, |m| m.end());
        let name = caps.get(2).map_or("", |m| m.as_str());
        let is_close = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();

        if is_close {
            if stack.last() == Some(&name) {
                stack.pop();
            } else if let Some(pos) = stack.iter().rposition(|open| *open == name) {
                out.push_str(&text[copied..start]);
                for inner in stack.drain(pos + 1..).rev() {
                    out.push_str("</");
                    out.push_str(inner);
                    out.push('>');
                }
                copied = start;
                stack.pop();
            }
        } else if !self_closing {
            stack.push(name);
        }
        cursor = start + whole;
    }

    if copied == 0 && stack.is_empty() {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[copied..]);
    for open in stack.iter().rev() {
        out.push_str("</");
        out.push_str(open);
        out.push('>');
    }
    Cow::Owned(out)
}

/// Runs the repair chain
pub struct XmlRepairer {
    parser: XmlParser,
    strategies: Vec<Box<dyn RepairStrategy>>,
}

impl XmlRepairer {
    /// Default chain: lenient re-parse, then textual fixes
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(LenientReparse::new()),
            Box::new(TextualFixes),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn RepairStrategy>>) -> Self {
        Self {
            parser: XmlParser::new(),
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy once, in order; the first well-formed candidate wins
    pub fn repair(&self, raw: &[u8]) -> Result<Repaired, RepairFailure> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let candidate = strategy.attempt(raw).and_then(|(content, method)| {
                self.parser
                    .check(&content)
                    .map(|()| (content, method))
                    .map_err(|ParseFailure { reason }| format!("still malformed: {}", reason))
            });

            match candidate {
                Ok((content, method)) => {
                    info!(strategy = strategy.name(), "document repaired");
                    return Ok(Repaired { content, method });
                }
                Err(reason) => {
                    debug!(strategy = strategy.name(), %reason, "repair strategy failed");
                    attempts.push((strategy.name(), reason));
                }
            }
        }

        Err(RepairFailure { attempts })
    }
}

impl Default for XmlRepairer {
    fn default() -> Self {
        Self::new()
    }
}
