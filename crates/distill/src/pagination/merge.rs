// ABOUTME: Merges per-page body fragments, dropping text already seen on an earlier page.
// ABOUTME: Repeats are removed per inline run and then per sentence, leaving surrounding markup intact.

use std::collections::HashSet;

use dom_query::{Document, NodeRef};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::PAGE_BREAK;
use crate::dom::text::{block_text, is_block_tag, normalize_whitespace};

/// Sentences shorter than this are never treated as repeats.
const MIN_SENTENCE_CHARS: usize = 12;

static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid sentence regex"));

/// Accumulates page fragments in fetch order.
#[derive(Debug, Default)]
pub struct PageMerger {
    seen_runs: HashSet<String>,
    seen_sentences: HashSet<String>,
    fragments: Vec<String>,
    last_text: Option<String>,
}

/// Keys first seen on the page being merged.
#[derive(Default)]
struct NewKeys {
    runs: Vec<String>,
    sentences: Vec<String>,
}

impl PageMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one page body. Returns false when nothing new survived.
    pub fn push(&mut self, html: &str) -> bool {
        let text = normalize_whitespace(&block_text(html));
        if text.is_empty() {
            return false;
        }
        if self.last_text.as_deref() == Some(text.as_str()) {
            debug!("page identical to the previous one, skipped");
            return false;
        }
        self.last_text = Some(text);

        let doc = Document::from(html);
        let mut runs = Vec::new();
        for body in doc.select("body").nodes() {
            collect_runs(body, &mut runs);
        }
        let mut new_keys = NewKeys::default();
        for run in &runs {
            self.dedup_run(run, &mut new_keys);
        }

        let merged = doc.select("body").inner_html().to_string();
        if block_text(&merged).is_empty() {
            debug!("page held only repeated text, skipped");
            return false;
        }
        self.seen_runs.extend(new_keys.runs);
        self.seen_sentences.extend(new_keys.sentences);
        self.fragments.push(merged);
        true
    }

    pub fn page_count(&self) -> usize {
        self.fragments.len()
    }

    /// The merged body, pages separated by a page-break rule.
    pub fn into_html(self) -> String {
        self.fragments.join(PAGE_BREAK)
    }

    fn dedup_run(&self, run: &[NodeRef], new_keys: &mut NewKeys) {
        let text = normalize_whitespace(&run.iter().map(|n| n.text().to_string()).collect::<String>());
        if text.is_empty() {
            return;
        }
        let key = text.to_lowercase();
        if self.seen_runs.contains(&key) {
            debug!(run = %text, "dropping repeated text");
            remove_run(run);
            return;
        }
        new_keys.runs.push(key);

        for sentence in split_sentences(&text) {
            if sentence.chars().count() < MIN_SENTENCE_CHARS {
                continue;
            }
            let key = sentence.to_lowercase();
            if !self.seen_sentences.contains(&key) {
                new_keys.sentences.push(key);
                continue;
            }
            // A sentence split across inline elements stays put.
            match run.iter().find(|n| n.is_text() && normalize_whitespace(&n.text()).contains(&sentence)) {
                Some(node) => {
                    debug!(sentence = %sentence, "dropping repeated sentence");
                    cut_sentence(node, &sentence);
                }
                None => debug!(sentence = %sentence, "repeated sentence spans markup, kept"),
            }
        }
        if let Some(parent) = run.first().and_then(|n| n.parent()) {
            remove_if_emptied(&parent);
        }
    }
}

/// Splits an element's children into runs of inline content.
///
/// A run is a maximal sequence of sibling text nodes and inline elements;
/// blocks and `<br>` end it. Inline elements that hold a block or a `<br>`
/// are descended into instead.
fn collect_runs<'a>(parent: &NodeRef<'a>, out: &mut Vec<Vec<NodeRef<'a>>>) {
    let mut run: Vec<NodeRef<'a>> = Vec::new();
    for child in parent.children() {
        if child.is_text() || (child.is_element() && is_inline(&child)) {
            run.push(child);
            continue;
        }
        if !child.is_element() {
            continue;
        }
        flush(&mut run, out);
        if !is_break(&child) {
            collect_runs(&child, out);
        }
    }
    flush(&mut run, out);
}

fn flush<'a>(run: &mut Vec<NodeRef<'a>>, out: &mut Vec<Vec<NodeRef<'a>>>) {
    if run.iter().any(|n| !n.text().trim().is_empty()) {
        out.push(std::mem::take(run));
    } else {
        run.clear();
    }
}

fn is_inline(node: &NodeRef) -> bool {
    !is_block(node)
        && !is_break(node)
        && !node
            .descendants()
            .iter()
            .any(|d| is_block(d) || is_break(d))
}

fn is_block(node: &NodeRef) -> bool {
    node.node_name()
        .as_deref()
        .map_or(false, is_block_tag)
}

fn is_break(node: &NodeRef) -> bool {
    node.node_name().as_deref() == Some("br")
}

fn remove_run(run: &[NodeRef]) {
    let parent = run.first().and_then(|n| n.parent());
    for node in run {
        node.remove_from_parent();
    }
    if let Some(parent) = parent {
        remove_if_emptied(&parent);
    }
}

/// Drops a block left with no text and no media.
fn remove_if_emptied(node: &NodeRef) {
    if !is_block(node) || !node.text().trim().is_empty() {
        return;
    }
    let has_media = node
        .descendants()
        .iter()
        .any(|d| matches!(d.node_name().as_deref(), Some("img" | "picture" | "video" | "iframe")));
    if !has_media {
        node.remove_from_parent();
    }
}

/// Removes the first occurrence of `sentence` from a text node, keeping the
/// spacing that separates it from neighbouring inline elements.
fn cut_sentence(node: &NodeRef, sentence: &str) {
    let raw = node.text();
    let normalized = normalize_whitespace(&raw);
    let rest = normalized.replacen(sentence, "", 1);
    let core = normalize_whitespace(&rest);
    let lead = raw.starts_with(char::is_whitespace);
    let trail = raw.ends_with(char::is_whitespace);
    let updated = if core.is_empty() {
        if lead || trail { " ".to_string() } else { String::new() }
    } else {
        format!(
            "{}{}{}",
            if lead { " " } else { "" },
            core,
            if trail { " " } else { "" }
        )
    };
    node.set_text(updated);
}

fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
