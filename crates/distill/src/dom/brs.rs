// ABOUTME: Double line-break paragraphing for markup that separates paragraphs with <br> runs.
// ABOUTME: Splits on runs of two or more <br> and wraps each loose segment in <p>.

use once_cell::sync::Lazy;
use regex::Regex;

/// Two or more consecutive `<br>` tags, with only whitespace between them.
static BR_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:<br\s*/?>\s*){2,}").expect("valid br-run regex"));

static BLOCK_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<(p|div|article|section|h[1-6]|ul|ol|blockquote|figure|pre|table|hr)[\s>/]")
        .expect("valid block-start regex")
});

/// Returns true if the markup contains a run of two or more line breaks.
pub fn has_double_br(html: &str) -> bool {
    BR_RUN_RE.is_match(html)
}

/// Converts `<br>` runs into paragraph boundaries.
///
/// Returns `None` when there is no run to convert. Segments that already
/// start with a block element are kept as they are; every other non-empty
/// segment is wrapped in `<p>`.
pub fn brs_to_ps(html: &str) -> Option<String> {
    if !has_double_br(html) {
        return None;
    }
    let mut output = String::with_capacity(html.len() + 32);
    for segment in BR_RUN_RE.split(html) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        if BLOCK_START_RE.is_match(trimmed) {
            output.push_str(trimmed);
        } else {
            output.push_str("<p>");
            output.push_str(trimmed);
            output.push_str("</p>");
        }
    }
    Some(output)
}
