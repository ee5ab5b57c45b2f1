// ABOUTME: Pagination Crawler: discovers continuation pages and fetches them one at a time.
// ABOUTME: Stops on a missing link, a revisit, the page limit or a failed page; partial bodies are kept.

//! Multi-page articles.
//!
//! Discovery runs on the untouched page, before any directive has removed
//! navigation. A profile either names its next-page link with rules or asks
//! for autodetection; rules win when both are present. A resolvable
//! `single_page_link` replaces the walk with one fetch.
//!
//! Autodetection picks, in order:
//! 1. the first `link[rel=next]` or `a[rel=next]` with an href;
//! 2. the first `a[href]` whose rel contains `next`, whose label reads like
//!    "next", "older", "more" or an arrow, or whose class or id contains the
//!    word `next`. Labels that read like "previous", "back" or "newer" never
//!    qualify.
//!
//! Only same-origin http(s) targets are autodetected.

pub mod merge;

use std::collections::HashSet;

use dom_query::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::directives::DirectiveEngine;
use crate::error::ExtractError;
use crate::extractors;
use crate::profiles::ExtractionProfile;
use crate::query::{Match, QueryEvaluator};
use crate::resource::PageFetcher;
use crate::result::ExtractionMethod;

pub use merge::PageMerger;

/// Separator between merged pages.
pub const PAGE_BREAK: &str = "<hr data-page-break=\"true\" />";

/// Default upper bound on pages per article, the first page included.
pub const DEFAULT_MAX_PAGES: usize = 5;

static NEXT_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bnext\b|\bolder\b|\bmore\b|[»›→]").expect("valid next label regex")
});

static PREV_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bprev\b|\bprevious\b|\bback\b|\bnewer\b").expect("valid prev label regex")
});

static NEXT_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bnext\b").expect("valid next hint regex"));

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoNextPage,
    Revisited,
    MaxPages,
    FetchFailed,
    NoContent,
    SinglePage,
}

/// Continuation targets found on a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLinks {
    pub single_page: Option<Url>,
    pub next: Option<Url>,
}

/// Reads a page's single-page and next-page targets.
pub fn discover_links(
    doc: &Document,
    profile: &ExtractionProfile,
    engine: &DirectiveEngine,
    base: &Url,
) -> PageLinks {
    let single_page = rule_link(engine, &profile.single_page_link, doc, base, "single_page_link");
    let next = if !profile.next_page_link.is_empty() {
        rule_link(engine, &profile.next_page_link, doc, base, "next_page_link")
    } else if profile.autodetect_next_page {
        autodetect_next(doc, base)
    } else {
        None
    };
    PageLinks { single_page, next }
}

fn rule_link(
    engine: &DirectiveEngine,
    rules: &[String],
    doc: &Document,
    base: &Url,
    directive: &str,
) -> Option<Url> {
    rules.iter().find_map(|rule| {
        engine
            .evaluate_rule(rule, doc, directive)
            .iter()
            .find_map(|m| link_target(m, base))
    })
}

/// An attribute match's value, or a node's href, or node text that is itself a URL.
fn link_target(m: &Match, base: &Url) -> Option<Url> {
    let raw = match m {
        Match::Attr { value, .. } => value.trim().to_string(),
        Match::Node(node) => match node.attr("href") {
            Some(href) => href.trim().to_string(),
            None => {
                let text = m.value();
                if text.starts_with("http://") || text.starts_with("https://") || text.starts_with('/') {
                    text
                } else {
                    return None;
                }
            }
        },
    };
    resolve(base, &raw)
}

fn resolve(base: &Url, raw: &str) -> Option<Url> {
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return None;
    }
    base.join(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// Finds a "next page" link without site rules.
pub fn autodetect_next(doc: &Document, base: &Url) -> Option<Url> {
    let same_origin = |u: &Url| u.origin() == base.origin();

    for node in doc.select("link[rel=next][href], a[rel=next][href]").nodes() {
        if let Some(url) = node.attr("href").and_then(|h| resolve(base, h.trim())) {
            if same_origin(&url) {
                return Some(url);
            }
        }
    }

    for node in doc.select("a[href]").nodes() {
        let rel = node.attr("rel").map(|v| v.to_lowercase()).unwrap_or_default();
        let label = format!(
            "{} {}",
            node.text(),
            node.attr("aria-label").map(|v| v.to_string()).unwrap_or_default()
        );
        if PREV_LABEL_RE.is_match(&label) {
            continue;
        }
        let hint = format!(
            "{} {}",
            node.attr("class").map(|v| v.to_string()).unwrap_or_default(),
            node.attr("id").map(|v| v.to_string()).unwrap_or_default()
        );
        let looks_next = rel.split_whitespace().any(|r| r.contains("next"))
            || NEXT_LABEL_RE.is_match(&label)
            || NEXT_HINT_RE.is_match(&hint);
        if !looks_next {
            continue;
        }
        let Some(url) = node.attr("href").and_then(|h| resolve(base, h.trim())) else {
            continue;
        };
        if same_origin(&url) {
            return Some(url);
        }
    }
    None
}

/// Visited-set key: the URL without its fragment.
fn visit_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.to_string()
}

fn mark(visited: &mut HashSet<String>, order: &mut Vec<String>, url: &Url) {
    let key = visit_key(url);
    if visited.insert(key.clone()) {
        order.push(key);
    }
}

/// What one continuation page contributed.
struct PageOutcome {
    body: Option<String>,
    next: Option<Url>,
    final_url: Url,
}

/// Result of a crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub html: String,
    pub page_count: usize,
    pub stop: StopReason,
    pub visited: Vec<String>,
}

/// Walks continuation pages for one extraction run.
///
/// The profile is borrowed for the whole crawl, so every page sees the same rules.
pub struct Crawler<'a> {
    fetcher: &'a dyn PageFetcher,
    evaluator: &'a dyn QueryEvaluator,
    profile: &'a ExtractionProfile,
    method: ExtractionMethod,
    max_pages: usize,
}

impl<'a> Crawler<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        evaluator: &'a dyn QueryEvaluator,
        profile: &'a ExtractionProfile,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            profile,
            method,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Follows `links` from the first page, merging each page's body in fetch order.
    #[instrument(skip_all, fields(url = %first_url))]
    pub async fn crawl(&self, first_url: &Url, first_body: String, links: PageLinks) -> CrawlOutcome {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        mark(&mut visited, &mut order, first_url);

        let mut merger = PageMerger::new();
        merger.push(&first_body);

        if let Some(single) = links.single_page {
            if !visited.contains(&visit_key(&single)) {
                mark(&mut visited, &mut order, &single);
                match self.fetch_and_process(&single).await {
                    Ok(PageOutcome { body: Some(body), final_url, .. }) => {
                        mark(&mut visited, &mut order, &final_url);
                        info!(url = %single, "using single-page view");
                        let mut whole = PageMerger::new();
                        if whole.push(&body) {
                            return CrawlOutcome {
                                html: whole.into_html(),
                                page_count: 1,
                                stop: StopReason::SinglePage,
                                visited: order,
                            };
                        }
                    }
                    Ok(PageOutcome { body: None, .. }) => {
                        debug!(url = %single, "single-page view had no body");
                    }
                    Err(e) => warn!(error = %e, "single-page view unavailable"),
                }
            }
        }

        let mut fetched = 1usize;
        let mut next = links.next;
        let stop = loop {
            if fetched >= self.max_pages {
                break StopReason::MaxPages;
            }
            let Some(target) = next.take() else {
                break StopReason::NoNextPage;
            };
            if visited.contains(&visit_key(&target)) {
                debug!(url = %target, "next page already visited");
                break StopReason::Revisited;
            }
            mark(&mut visited, &mut order, &target);
            fetched += 1;

            let outcome = match self.fetch_and_process(&target).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "stopping pagination");
                    break StopReason::FetchFailed;
                }
            };
            mark(&mut visited, &mut order, &outcome.final_url);
            match outcome.body {
                Some(body) => {
                    if !merger.push(&body) {
                        debug!(url = %target, "page added nothing new");
                    }
                }
                None => {
                    let err = ExtractError::page_fetch_failure(target.as_str(), "ExtractPage", None);
                    warn!(error = %err, "no body on continuation page, stopping pagination");
                    break StopReason::NoContent;
                }
            }
            next = outcome.next;
        };

        info!(pages = merger.page_count(), stop = ?stop, "pagination finished");
        CrawlOutcome {
            page_count: merger.page_count().max(1),
            html: merger.into_html(),
            stop,
            visited: order,
        }
    }

    async fn fetch_and_process(&self, target: &Url) -> Result<PageOutcome, ExtractError> {
        let page = self.fetcher.fetch_page(target.as_str()).await.map_err(|e| {
            ExtractError::page_fetch_failure(target.as_str(), "FetchPage", Some(e.into()))
        })?;
        let base = Url::parse(&page.final_url).unwrap_or_else(|_| target.clone());
        Ok(self.process(&page.html, base))
    }

    /// Parses and extracts one continuation page. The document never outlives this call.
    fn process(&self, html: &str, base: Url) -> PageOutcome {
        let doc = Document::from(self.profile.preprocess(html).as_str());
        let engine = DirectiveEngine::new(self.evaluator, base.as_str());
        let links = discover_links(&doc, self.profile, &engine, &base);
        let body = extractors::page_body(&engine, &doc, self.profile, self.method);
        PageOutcome {
            body,
            next: links.next,
            final_url: base,
        }
    }
}
