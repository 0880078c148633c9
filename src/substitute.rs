//! Literal find/replace confined to the located element's text

use std::borrow::Cow;

use crate::locator::ElementText;

/// Result of a substitution over one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub text: String,
    pub count: usize,
}

/// Replace every non-overlapping occurrence of `old` with `new`, left to right.
///
/// An empty `old` never matches.
pub fn substitute(text: &str, old: &str, new: &str) -> Substitution {
    if old.is_empty() {
        return Substitution {
            text: text.to_string(),
            count: 0,
        };
    }
    Substitution {
        text: text.replace(old, new),
        count: text.matches(old).count(),
    }
}

/// Escape the characters that cannot appear literally in element text.
///
/// `>` is escaped so a `]]>` sequence can never form, and `\r` so it survives
/// line-ending normalization on the next parse.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '\r']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#13;"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

/// Escape decoded text for a slice that held `raw`, keeping its CRLF line endings
fn reescape(text: &str, raw: &str) -> String {
    let escaped = escape_text(text);
    if raw.contains("\r\n") {
        escaped.replace('\n', "\r\n")
    } else {
        escaped.into_owned()
    }
}

/// Source text after substituting inside the located element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub content: String,
    pub count: usize,
}

/// Apply the substitution to `element` and splice the result back into `source`.
///
/// Bytes outside the element's text are copied unchanged. When the raw text has
/// no escapes the replacement happens on the raw bytes, so untouched characters
/// keep their exact form; otherwise the substituted text is re-escaped, which
/// also turns CDATA sections into escaped character data.
pub fn rewrite_element(source: &str, element: &ElementText<'_>, old: &str, new: &str) -> Rewrite {
    let substitution = substitute(element.text, old, new);
    if substitution.count == 0 {
        return Rewrite {
            content: source.to_string(),
            count: 0,
        };
    }

    let replacement = if element.raw == element.text {
        let spliced = element.raw.replace(old, &escape_text(new));
        // removing text can join a `]]` and a `>` that were apart
        if spliced.contains("]]>") {
            reescape(&substitution.text, element.raw)
        } else {
            spliced
        }
    } else {
        reescape(&substitution.text, element.raw)
    };

    let range = &element.range;
    let mut content =
        String::with_capacity(source.len() - element.raw.len() + replacement.len());
    content.push_str(&source[..range.start]);
    content.push_str(&replacement);
    content.push_str(&source[range.end..]);

    Rewrite {
        content,
        count: substitution.count,
    }
}
