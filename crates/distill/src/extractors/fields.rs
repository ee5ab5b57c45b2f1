// ABOUTME: Page-level metadata extraction: document title, byline, dates, site name, language, lead image.
// ABOUTME: Selector lists are tried in order against the untouched page; first non-empty value wins.

//! Generic field extraction.
//!
//! Key behaviors:
//! - Selectors are tried in order; first non-empty match wins.
//! - Whitespace is normalized (collapsed to single spaces, trimmed).
//! - Empty strings are treated as no match.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::dom::text::normalize_whitespace;

const META_AUTHOR_SELECTORS: &[&str] = &[
    "meta[name='author']",
    "meta[property='article:author']",
    "meta[name='twitter:creator']",
];

const DOM_AUTHOR_SELECTORS: &[&str] = &[
    "[rel='author']",
    "[class*='author-name']",
    "[class*='byline']",
    "[itemprop='author']",
    ".author",
    ".byline",
    "address",
];

const DATE_META_SELECTORS: &[&str] = &[
    "meta[property='article:published_time']",
    "meta[name='date']",
    "meta[name='pubdate']",
    "meta[itemprop='datePublished']",
];

const IMAGE_SELECTORS: &[(&str, &str)] = &[
    ("meta[property='og:image']", "content"),
    ("meta[property='og:image:url']", "content"),
    ("meta[name='twitter:image']", "content"),
    ("meta[name='twitter:image:src']", "content"),
    ("meta[itemprop='image']", "content"),
    ("link[rel='image_src']", "href"),
];

static BY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:written\s+)?by\s+").expect("valid byline regex"));

/// Extracts an attribute value from the first matching selector that yields a non-empty result.
pub fn extract_first_attr(doc: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    for &sel_str in selectors {
        let sel = match Selector::parse(sel_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for el in doc.select(&sel) {
            if let Some(value) = el.value().attr(attr) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

/// Extracts text from the first selector that yields a non-empty match.
///
/// Meta selectors read the `content` attribute; anything else reads
/// normalized inner text.
pub fn extract_field_text_single(doc: &Html, selectors: &[&str]) -> Option<String> {
    for &sel_str in selectors {
        if sel_str.starts_with("meta[") {
            if let Some(value) = extract_first_attr(doc, &[sel_str], "content") {
                return Some(value);
            }
            continue;
        }
        let sel = match Selector::parse(sel_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for el in doc.select(&sel) {
            let text: String = el.text().collect::<Vec<_>>().join(" ");
            let normalized = normalize_whitespace(&text);
            if !normalized.is_empty() {
                return Some(normalized);
            }
        }
    }
    None
}

/// Normalizes a language/locale string to its primary language tag.
///
/// For example: "en_US" -> "en", "EN-GB" -> "en".
pub fn normalize_lang(value: &str) -> String {
    let trimmed = value.trim().to_lowercase();
    trimmed
        .split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .to_string()
}

/// Parses a date string, trying RFC 3339 first, then common loose formats, then dateparser.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Date-only forms parsed as UTC midnight, avoiding local timezone shifts.
    const LOOSE_PATTERNS: &[&str] = &[
        "%Y-%m-%d",
        "%b %e, %Y",
        "%e %b %Y",
        "%B %e, %Y",
        "%e %B %Y",
        "%B %d, %Y",
        "%d %B %Y",
    ];
    for pat in LOOSE_PATTERNS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, pat) {
            let naive_dt = date.and_hms_opt(0, 0, 0)?;
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    dateparser::parse(s).ok().map(|dt| dt.with_timezone(&Utc))
}

/// The document-level title: `<title>`, then `og:title`.
pub fn document_title(doc: &Html) -> Option<String> {
    extract_field_text_single(doc, &["title", "meta[property='og:title']"])
}

/// Title used when no profile rule produced one.
///
/// A leading `<h1>` wins when its text is longer than half the document title.
pub fn fallback_title(doc: &Html) -> Option<String> {
    let title = document_title(doc).unwrap_or_default();
    if let Some(h1) = extract_field_text_single(doc, &["h1"]) {
        if h1.chars().count() as f64 > title.chars().count() as f64 * 0.5 {
            return Some(h1);
        }
    }
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Cleans a raw byline, rejecting implausible lengths.
pub fn clean_byline(raw: &str) -> Option<String> {
    let text = normalize_whitespace(raw);
    let text = BY_PREFIX_RE.replace(&text, "").trim().to_string();
    let len = text.chars().count();
    if (2..=100).contains(&len) {
        Some(text)
    } else {
        None
    }
}

/// Byline from meta tags.
pub fn meta_byline(doc: &Html) -> Option<String> {
    extract_first_attr(doc, META_AUTHOR_SELECTORS, "content").and_then(|a| clean_byline(&a))
}

/// Byline from common author markup.
pub fn dom_byline(doc: &Html) -> Option<String> {
    for &sel_str in DOM_AUTHOR_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        for el in doc.select(&sel) {
            let text: String = el.text().collect::<Vec<_>>().join(" ");
            if let Some(byline) = clean_byline(&text) {
                return Some(byline);
            }
        }
    }
    None
}

/// Published time from meta tags and `<time>` elements.
pub fn published_time(doc: &Html) -> Option<DateTime<Utc>> {
    for sel in DATE_META_SELECTORS {
        if let Some(content) = extract_first_attr(doc, &[sel], "content") {
            if let Some(dt) = parse_date(&content) {
                return Some(dt);
            }
        }
    }
    if let Some(value) = extract_first_attr(doc, &["time[datetime]", "time[pubdate]"], "datetime")
    {
        if let Some(dt) = parse_date(&value) {
            return Some(dt);
        }
    }
    extract_field_text_single(doc, &["time"]).and_then(|t| parse_date(&t))
}

/// Site name from `og:site_name` or `application-name`.
pub fn site_name(doc: &Html) -> Option<String> {
    extract_first_attr(
        doc,
        &["meta[property='og:site_name']", "meta[name='application-name']"],
        "content",
    )
}

/// Primary language tag from `<html lang>`, then locale meta tags.
pub fn language(doc: &Html) -> Option<String> {
    let raw = extract_first_attr(doc, &["html"], "lang").or_else(|| {
        extract_first_attr(
            doc,
            &["meta[property='og:locale']", "meta[name='language']"],
            "content",
        )
    })?;
    let lang = normalize_lang(&raw);
    if lang.is_empty() {
        None
    } else {
        Some(lang)
    }
}

/// Page-level preview image, resolved against `base`.
pub fn lead_image(doc: &Html, base: &Url) -> Option<String> {
    for (sel, attr) in IMAGE_SELECTORS {
        if let Some(raw) = extract_first_attr(doc, &[sel], attr) {
            if let Ok(abs) = base.join(&raw) {
                if matches!(abs.scheme(), "http" | "https") {
                    return Some(abs.to_string());
                }
            }
        }
    }
    None
}

/// First 300 characters of `text`, with `...` when truncated.
pub fn excerpt(text: &str) -> String {
    let normalized = normalize_whitespace(text);
    if normalized.chars().count() <= 300 {
        return normalized;
    }
    let head: String = normalized.chars().take(300).collect();
    format!("{}...", head.trim_end())
}

/// Metadata read once from the untouched first page.
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub published_time: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
    pub language: Option<String>,
    pub lead_image_url: Option<String>,
}

impl PageMetadata {
    pub fn extract(doc: &Html, base: &Url) -> Self {
        Self {
            title: fallback_title(doc),
            byline: meta_byline(doc).or_else(|| dom_byline(doc)),
            published_time: published_time(doc),
            site_name: site_name(doc),
            language: language(doc),
            lead_image_url: lead_image(doc, base),
        }
    }
}
