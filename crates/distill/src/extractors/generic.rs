// ABOUTME: Generic fallback strategy: paragraph-density scoring over a cleaned private copy of the page.
// ABOUTME: Falls back to common content containers, then to the whole body.

use dom_query::{Document, Matcher, NodeId, NodeRef, Selection};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dom::text::{normalize_whitespace, text_len};

const NOISE_TAGS: &str = "script, style, noscript, iframe, object, embed, nav, header, footer, aside, form";

const CLUTTER_SELECTORS: &str = "[class*='social'], [id*='social'], [class*='share'], \
    [class*='newsletter'], [class*='subscribe'], [class*='popup'], [class*='modal'], \
    [class*='overlay'], [class~='ad'], [id~='ad'], [class~='ads'], [class*='advert'], \
    [id*='advert'], [data-ad], [data-advertisement], .sidebar, .related-articles, .sponsored, .promo";

const CONTAINER_SELECTORS: &[&str] = &["article", ".post", ".entry", ".content", "#content", "main", ".main"];

/// Paragraphs shorter than this carry no score.
const MIN_PARAGRAPH_CHARS: usize = 50;

static UNWANTED_REGION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)comment|meta|footer|sidebar").expect("valid region regex"));

static AD_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)advertisement|sponsored|promo|banner|popup").expect("valid ad hint regex")
});

static CLUTTER: Lazy<Option<Matcher>> = Lazy::new(|| Matcher::new(CLUTTER_SELECTORS).ok());

/// Chooses a body from `html` by paragraph scoring.
///
/// The scored candidate is returned as soon as one exists; otherwise the
/// first common content container longer than `min_len` wins, then the whole body.
pub fn extract_body(html: &str, min_len: usize) -> Option<String> {
    let doc = Document::from(html);
    remove_noise(&doc);

    if let Some(best) = top_candidate(&doc) {
        let sel = Selection::from(best);
        remove_clutter(&sel);
        if text_len(&sel.text()) > 0 {
            debug!("generic body chosen by paragraph score");
            return Some(sel.inner_html().to_string());
        }
    }

    for css in CONTAINER_SELECTORS {
        let found = doc.select(css);
        let Some(node) = found.nodes().first() else {
            continue;
        };
        if text_len(&node.text()) > min_len {
            let sel = Selection::from(node.clone());
            remove_clutter(&sel);
            debug!(selector = css, "generic body chosen by content container");
            return Some(sel.inner_html().to_string());
        }
    }

    let body = doc.select("body");
    remove_clutter(&body);
    if text_len(&body.text()) == 0 {
        return None;
    }
    debug!("generic body is the whole page body");
    Some(body.inner_html().to_string())
}

fn remove_noise(doc: &Document) {
    doc.select(NOISE_TAGS).remove();

    if let Some(ref clutter) = *CLUTTER {
        for node in doc.select_matcher(clutter).nodes().iter().rev() {
            if !is_root_element(node) {
                node.remove_from_parent();
            }
        }
    }

    // Short elements whose class or id reads like an ad slot.
    let all = doc.select("body *");
    for node in all.nodes().iter().rev() {
        if AD_HINT_RE.is_match(&attr_hint(node)) && text_len(&node.text()) < 200 {
            node.remove_from_parent();
        }
    }
}

fn remove_clutter(sel: &Selection) {
    if let Some(ref clutter) = *CLUTTER {
        sel.select_matcher(clutter).remove();
    }
}

fn is_root_element(node: &NodeRef) -> bool {
    matches!(node.node_name().as_deref(), Some("html") | Some("body"))
}

fn attr_hint(node: &NodeRef) -> String {
    format!(
        "{} {}",
        node.attr("class").map(|v| v.to_string()).unwrap_or_default(),
        node.attr("id").map(|v| v.to_string()).unwrap_or_default()
    )
}

/// Score of one paragraph: length / 100, +1 for being a paragraph, -5 in unwanted regions.
fn paragraph_score(p: &NodeRef) -> f64 {
    let len = normalize_whitespace(&p.text()).chars().count();
    if len < MIN_PARAGRAPH_CHARS {
        return 0.0;
    }
    let mut score = len as f64 / 100.0 + 1.0;
    if UNWANTED_REGION_RE.is_match(&attr_hint(p)) {
        score -= 5.0;
    }
    score
}

/// The parent with the highest summed paragraph score, first in document order on ties.
fn top_candidate<'a>(doc: &'a Document) -> Option<NodeRef<'a>> {
    let mut scored: Vec<(NodeId, NodeRef<'a>, f64)> = Vec::new();
    for p in doc.select("p").nodes() {
        let Some(parent) = p.parent() else {
            continue;
        };
        if parent.node_name().as_deref() == Some("blockquote") {
            continue;
        }
        let score = paragraph_score(p);
        if score <= 0.0 {
            continue;
        }
        match scored.iter_mut().find(|(id, _, _)| *id == parent.id) {
            Some(entry) => entry.2 += score,
            None => scored.push((parent.id, parent, score)),
        }
    }

    let mut best: Option<(NodeRef<'a>, f64)> = None;
    for (_, node, score) in scored {
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((node, score));
        }
    }
    best.map(|(node, _)| node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(word: &str) -> String {
        format!("This paragraph about {} has more than enough characters to count.", word)
    }

    #[test]
    fn picks_densest_parent() {
        let html = format!(
            r#"<html><body>
            <nav><p>{nav}</p></nav>
            <div id="teaser"><p>{a}</p></div>
            <div id="story"><p>{b}</p><p>{c}</p></div>
            </body></html>"#,
            nav = sentence("menus"),
            a = sentence("teasers"),
            b = sentence("the story"),
            c = sentence("the ending"),
        );
        let body = extract_body(&html, 500).unwrap();
        assert!(body.contains("the story"));
        assert!(body.contains("the ending"));
        assert!(!body.contains("teasers"));
        assert!(!body.contains("menus"));
    }

    #[test]
    fn unwanted_regions_are_penalized() {
        let html = format!(
            r#"<html><body>
            <div id="a"><p class="comment-body">{x}</p><p class="comment-body">{y}</p></div>
            <div id="b"><p>{z}</p></div>
            </body></html>"#,
            x = sentence("comments"),
            y = sentence("more comments"),
            z = sentence("content"),
        );
        let body = extract_body(&html, 500).unwrap();
        assert!(body.contains("content"));
        assert!(!body.contains("comments"));
    }

    #[test]
    fn blockquote_paragraphs_do_not_nominate() {
        let html = format!(
            "<html><body><blockquote><p>{}</p></blockquote><section><p>{}</p></section></body></html>",
            sentence("quotes"),
            sentence("prose")
        );
        let body = extract_body(&html, 500).unwrap();
        assert_eq!(body, format!("<p>{}</p>", sentence("prose")));
    }

    #[test]
    fn falls_back_to_containers_then_body() {
        let long = "word ".repeat(40);
        let html = format!(
            "<html><body><div class='content'>{}</div><span>tail</span></body></html>",
            long
        );
        let body = extract_body(&html, 100).unwrap();
        assert!(!body.contains("tail"));

        let html = "<html><body><span>just a little text</span></body></html>";
        let body = extract_body(html, 100).unwrap();
        assert!(body.contains("just a little text"));

        assert!(extract_body("<html><body><script>x()</script></body></html>", 100).is_none());
    }

    #[test]
    fn clutter_is_removed() {
        let html = format!(
            r#"<html><body class="share-enabled"><div><p>{}</p><div class="share-buttons">Share</div><div class="ad-banner">Buy</div></div></body></html>"#,
            sentence("clean text")
        );
        let body = extract_body(&html, 500).unwrap();
        assert!(body.contains("clean text"));
        assert!(!body.contains("Share"));
        assert!(!body.contains("Buy"));
    }
}
