// ABOUTME: Structured-data strategy: reads schema.org article records from JSON-LD script blocks.
// ABOUTME: Plain-text articleBody is rebuilt into paragraphs; page images from the article container are appended.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::dom::text::{escape_html, text_len};
use crate::paragraphs;

const ARTICLE_TYPES: &[&str] = &["NewsArticle", "Article", "BlogPosting"];

const IMAGE_CONTAINERS: &[&str] = &["article", "main", ".article-content", "[role='main']"];

/// Fields of one schema.org article record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredArticle {
    pub headline: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub publisher: Option<String>,
}

/// Every article record on the page, in document order.
pub fn articles(doc: &Html) -> Vec<StructuredArticle> {
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for script in doc.select(&selector) {
        let raw = script.text().collect::<String>();
        let value = match serde_json::from_str::<Value>(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "skipping malformed JSON-LD block");
                continue;
            }
        };
        for item in top_level_items(&value) {
            let item = main_entity(item);
            if is_article(item) {
                out.push(read_article(item));
            }
        }
    }
    out
}

/// A reconstructed structured-data body, when the page carries one long enough.
pub fn extract_body(doc: &Html, min_len: usize) -> Option<(StructuredArticle, String)> {
    for article in articles(doc) {
        let Some(text) = article.body.as_deref() else {
            continue;
        };
        if text_len(text) < min_len {
            debug!(len = text_len(text), min_len, "structured articleBody too short");
            continue;
        }
        let Some(paras) = paragraphs::reconstruct(text) else {
            continue;
        };
        let html = format!("<div>{}{}</div>", paras, page_figures(doc));
        return Some((article, html));
    }
    None
}

/// Objects to inspect: the value itself or its array items, plus any `@graph` members.
fn top_level_items(value: &Value) -> Vec<&Value> {
    let mut items: Vec<&Value> = match value {
        Value::Array(arr) => arr.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };
    let graphs: Vec<&Value> = items
        .iter()
        .filter_map(|v| v.get("@graph"))
        .filter_map(|g| g.as_array())
        .flatten()
        .collect();
    items.extend(graphs);
    items
}

/// Follows `WebPage.mainEntity` to the article it describes.
fn main_entity(value: &Value) -> &Value {
    if value.get("@type").map_or(false, |t| matches_type(t, "WebPage")) {
        if let Some(entity) = value.get("mainEntity").filter(|e| e.is_object()) {
            return entity;
        }
    }
    value
}

fn is_article(value: &Value) -> bool {
    value
        .get("@type")
        .map_or(false, |t| ARTICLE_TYPES.iter().any(|a| matches_type(t, a)))
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case(expected),
        Value::Array(arr) => arr.iter().any(|v| matches_type(v, expected)),
        _ => false,
    }
}

fn read_article(value: &Value) -> StructuredArticle {
    let string = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    StructuredArticle {
        headline: string("headline").or_else(|| string("name")),
        description: string("description"),
        body: string("articleBody"),
        author: value.get("author").and_then(person_names),
        date_published: string("datePublished"),
        publisher: value
            .get("publisher")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

/// Author as a string, a `{name}` object, or a list of either.
fn person_names(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Value::Array(arr) => {
            let names: Vec<String> = arr.iter().filter_map(person_names).collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(", "))
            }
        }
        _ => None,
    }
}

/// Figures for images inside the page's article container.
fn page_figures(doc: &Html) -> String {
    let Ok(img) = Selector::parse("img[src]") else {
        return String::new();
    };
    for container in IMAGE_CONTAINERS {
        let Ok(sel) = Selector::parse(container) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let mut out = String::new();
            for image in el.select(&img) {
                let src = image.value().attr("src").unwrap_or_default().trim();
                if src.is_empty() || src.starts_with("data:") {
                    continue;
                }
                let alt = image.value().attr("alt").unwrap_or_default();
                out.push_str(&format!(
                    "<figure><img src=\"{}\" alt=\"{}\"></figure>",
                    escape_html(src),
                    escape_html(alt)
                ));
            }
            return out;
        }
    }
    String::new()
}

/// Publisher name, else the page hostname without `www.`.
pub fn site_name_or_host(article: Option<&StructuredArticle>, base: &Url) -> Option<String> {
    article
        .and_then(|a| a.publisher.clone())
        .or_else(|| base.host_str().map(crate::profiles::normalize_host))
}
