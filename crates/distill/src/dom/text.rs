// ABOUTME: Text measurement and block-aware flattening of article markup into plain text.
// ABOUTME: Block elements and <br> become line boundaries; runs of whitespace collapse to one space.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Elements that start a new line when flattened to text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "tr", "td", "th", "ul",
];

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length of text in characters after whitespace normalization.
pub fn text_len(s: &str) -> usize {
    normalize_whitespace(s).chars().count()
}

/// Escapes text for use in element content or a double-quoted attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

/// Flattens an HTML fragment into plain text.
///
/// Every block element contributes its own line(s). Lines are
/// whitespace-normalized and empty lines dropped, then joined with `\n`.
pub fn block_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::with_capacity(html.len() / 2);
    collect_text(fragment.tree.root(), &mut raw);
    raw.lines()
        .map(normalize_whitespace)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => {
            // Source newlines inside inline content are not line boundaries.
            for c in t.chars() {
                out.push(if c == '\n' || c == '\r' { ' ' } else { c });
            }
        }
        Node::Element(el) => {
            let tag = el.name();
            if SKIP_TAGS.contains(&tag) {
                return;
            }
            if tag == "br" {
                out.push('\n');
                return;
            }
            let block = is_block_tag(tag);
            if block {
                out.push('\n');
            }
            for child in node.children() {
                collect_text(child, out);
            }
            if block {
                out.push('\n');
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_counts_chars() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(text_len("  héllo   wörld "), 11);
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_html(r#"a < b & "c""#), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn blocks_become_lines() {
        let text = block_text("<div><p>First  para.</p><p>Second\npara.</p></div>");
        assert_eq!(text, "First para.\nSecond para.");
    }

    #[test]
    fn inline_elements_do_not_split_lines() {
        let text = block_text("<p>Hello <b>bold</b> <a href='#'>link</a>.</p>");
        assert_eq!(text, "Hello bold link.");
    }

    #[test]
    fn br_and_skipped_tags() {
        let text = block_text("<p>one<br>two</p><script>var x = 1;</script><style>p{}</style>");
        assert_eq!(text, "one\ntwo");
    }
}
