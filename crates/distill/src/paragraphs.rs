// ABOUTME: Paragraph Reconstructor: turns newline-delimited plain text into paragraph markup.
// ABOUTME: Any run of newlines is a paragraph boundary; one-character leftovers are dropped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom::text::escape_html;

static NEWLINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\r\n|\r|\n)+").expect("valid newline regex"));

/// Splits plain text into trimmed paragraph segments.
pub fn segments(text: &str) -> Vec<&str> {
    NEWLINES_RE
        .split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > 1)
        .collect()
}

/// Wraps each segment of `text` in `<p>`, preserving order.
///
/// Returns `None` when no segment survives.
pub fn reconstruct(text: &str) -> Option<String> {
    let parts = segments(text);
    if parts.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len() + parts.len() * 8);
    for part in parts {
        out.push_str("<p>");
        out.push_str(&escape_html(part));
        out.push_str("</p>");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_newlines_split_paragraphs() {
        let html = reconstruct("Para one.\nPara two.\nPara three.").unwrap();
        assert_eq!(html, "<p>Para one.</p><p>Para two.</p><p>Para three.</p>");
    }

    #[test]
    fn runs_and_blank_segments() {
        let html = reconstruct("  First \n\n\r\n x \n\nSecond\n").unwrap();
        assert_eq!(html, "<p>First</p><p>Second</p>");
    }

    #[test]
    fn escapes_markup() {
        let html = reconstruct("a < b && c").unwrap();
        assert_eq!(html, "<p>a &lt; b &amp;&amp; c</p>");
    }

    #[test]
    fn nothing_left() {
        assert!(reconstruct("\n \n.\n").is_none());
        assert!(reconstruct("").is_none());
    }
}
