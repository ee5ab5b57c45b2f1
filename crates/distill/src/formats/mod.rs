// ABOUTME: Output format converters for extracted article bodies.
// ABOUTME: Sanitized HTML, Markdown and block-aware plain text, plus URL absolutization.

//! Output format conversion.
//!
//! The orchestrator absolutizes and sanitizes the merged body once; the
//! Markdown and text renderers then work from that sanitized markup.

use dom_query::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::dom::text::block_text;

static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid br regex"));

static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Sanitize article HTML with an ammonia allow-list.
///
/// Keeps text structure (headings, lists, quotes, code, tables), figures and
/// images, links, and the `hr[data-page-break]` separator between pages.
pub fn sanitize_html(html: &str) -> String {
    let allowed_tags = [
        "p", "br", "hr", "strong", "b", "em", "i", "u", "s", "sub", "sup", "h1", "h2", "h3", "h4",
        "h5", "h6", "ul", "ol", "li", "dl", "dt", "dd", "blockquote", "pre", "code", "img", "a",
        "span", "div", "figure", "figcaption", "table", "thead", "tbody", "tfoot", "tr", "th", "td",
        "caption",
    ];

    let mut builder = ammonia::Builder::new();
    builder.tags(allowed_tags.iter().copied().collect());

    builder.add_tag_attributes("a", &["href", "title"]);
    builder.add_tag_attributes("img", &["src", "alt", "title", "width", "height", "srcset", "sizes"]);
    builder.add_tag_attributes("hr", &["data-page-break"]);
    builder.add_tag_attributes("td", &["colspan", "rowspan"]);
    builder.add_tag_attributes("th", &["colspan", "rowspan"]);
    for h in &["h1", "h2", "h3", "h4", "h5", "h6"] {
        builder.add_tag_attributes(h, &["id"]);
    }

    builder
        .url_schemes(["http", "https", "mailto"].iter().copied().collect())
        .clean(html)
        .to_string()
}

/// Rewrites relative `img[src]`, `img[srcset]` and `a[href]` values against `base`.
pub fn absolutize_urls(html: &str, base: &Url) -> String {
    let doc = Document::from(html);
    for img in doc.select("img[src]").iter() {
        if let Some(src) = img.attr("src") {
            if let Some(abs) = absolutize(base, &src) {
                img.set_attr("src", &abs);
            }
        }
    }
    for img in doc.select("img[srcset]").iter() {
        if let Some(srcset) = img.attr("srcset") {
            img.set_attr("srcset", &absolutize_srcset(base, &srcset));
        }
    }
    for a in doc.select("a[href]").iter() {
        if let Some(href) = a.attr("href") {
            if href.starts_with('#') {
                continue;
            }
            if let Some(abs) = absolutize(base, &href) {
                a.set_attr("href", &abs);
            }
        }
    }
    doc.select("body").inner_html().to_string()
}

fn absolutize(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    base.join(raw).ok().map(|u| u.to_string())
}

fn absolutize_srcset(base: &Url, srcset: &str) -> String {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let url = absolutize(base, url).unwrap_or_else(|| url.to_string());
            let descriptor: Vec<&str> = parts.collect();
            Some(if descriptor.is_empty() {
                url
            } else {
                format!("{} {}", url, descriptor.join(" "))
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert HTML to Markdown using htmd.
///
/// Skips script and style tags, keeps links and images, and collapses runs
/// of blank lines to one. On conversion error the input is returned.
pub fn html_to_markdown(html: &str) -> String {
    let preprocessed = BR_RE.replace_all(html, "\n");

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript"])
        .build();

    let md = converter
        .convert(&preprocessed)
        .unwrap_or_else(|_| preprocessed.to_string());

    BLANK_LINES_RE.replace_all(&md, "\n\n").trim().to_string()
}

/// Convert HTML to plain text, one line per block element.
pub fn html_to_text(html: &str) -> String {
    block_text(html)
}
