// ABOUTME: ExtractionResult: the article record handed to downstream services, plus its provenance.
// ABOUTME: Includes the extraction method tag and rendering helpers for markdown and plain text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::formats::{html_to_markdown, html_to_text};
use crate::options::ContentType;

/// Maximum length of the client identifier recorded in provenance.
pub const CLIENT_ID_MAX_CHARS: usize = 100;

/// The strategy that produced the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    SiteConfig,
    StructuredData,
    #[default]
    DomFallback,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::SiteConfig => "site-config",
            ExtractionMethod::StructuredData => "structured-data",
            ExtractionMethod::DomFallback => "dom-fallback",
        };
        write!(f, "{}", s)
    }
}

/// Request provenance attached to every result.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Provenance {
    pub source_url: String,
    pub retrieved_at: DateTime<Utc>,
    pub client_id: String,
}

impl Provenance {
    pub fn new(
        source_url: impl Into<String>,
        client_id: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            retrieved_at,
            client_id: client_id.chars().take(CLIENT_ID_MAX_CHARS).collect(),
        }
    }
}

/// An extracted article.
///
/// `length` is always the character count of `text_content`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionResult {
    pub url: String,
    pub title: String,
    /// Sanitized body markup; pages are separated by `<hr data-page-break="true">`.
    pub content: String,
    pub text_content: String,
    pub length: usize,
    pub excerpt: String,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub published_time: Option<DateTime<Utc>>,
    pub extraction_method: ExtractionMethod,
    pub native_ad: bool,
    pub native_ad_clue: Option<String>,
    pub page_count: usize,
    pub language: Option<String>,
    pub lead_image_url: Option<String>,
    pub provenance: Provenance,
}

impl ExtractionResult {
    /// Sets body markup and recomputes the derived text fields.
    pub fn set_content(&mut self, html: String) {
        self.text_content = html_to_text(&html);
        self.length = self.text_content.chars().count();
        self.content = html;
    }

    /// The body in the requested format.
    pub fn render(&self, content_type: ContentType) -> String {
        match content_type {
            ContentType::Html => self.content.clone(),
            ContentType::Markdown => html_to_markdown(&self.content),
            ContentType::Text => self.text_content.clone(),
        }
    }

    /// Format the result as a markdown document.
    pub fn format_markdown(&self) -> String {
        let mut parts = Vec::new();

        if !self.title.is_empty() {
            parts.push(format!("# {}", self.title));
        }

        let mut meta = Vec::new();
        if let Some(ref byline) = self.byline {
            if !byline.is_empty() {
                meta.push(format!("By {}", byline));
            }
        }
        if let Some(date) = self.published_time {
            meta.push(date.format("%Y-%m-%d").to_string());
        }
        if !meta.is_empty() {
            parts.push(meta.join(" | "));
        }

        if !self.url.is_empty() {
            parts.push(format!("Source: {}", self.url));
        }

        if !self.excerpt.is_empty() {
            parts.push(format!("> {}", self.excerpt));
        }

        let body = html_to_markdown(&self.content);
        if !parts.is_empty() && !body.is_empty() {
            parts.push("---".to_string());
        }
        if !body.is_empty() {
            parts.push(body);
        }

        parts.join("\n\n")
    }

    pub fn has_byline(&self) -> bool {
        self.byline.as_ref().map_or(false, |a| !a.is_empty())
    }

    /// Count words in the plain text.
    pub fn word_count(&self) -> usize {
        self.text_content.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn method_serializes_kebab_case() {
        let json = serde_json::to_string(&ExtractionMethod::StructuredData).unwrap();
        assert_eq!(json, "\"structured-data\"");
        let back: ExtractionMethod = serde_json::from_str("\"site-config\"").unwrap();
        assert_eq!(back, ExtractionMethod::SiteConfig);
        assert_eq!(ExtractionMethod::DomFallback.to_string(), "dom-fallback");
    }

    #[test]
    fn length_tracks_text_content() {
        let mut result = ExtractionResult::default();
        result.set_content("<p>héllo</p><p>wörld</p>".to_string());
        assert_eq!(result.text_content, "héllo\nwörld");
        assert_eq!(result.length, result.text_content.chars().count());
        assert_eq!(result.word_count(), 2);
    }

    #[test]
    fn provenance_truncates_client_id() {
        let long = "a".repeat(150);
        let p = Provenance::new("https://example.com/", &long, Utc::now());
        assert_eq!(p.client_id.chars().count(), CLIENT_ID_MAX_CHARS);
        assert_eq!(p.source_url, "https://example.com/");
    }

    #[test]
    fn format_markdown_full() {
        let mut result = ExtractionResult {
            url: "https://example.com/article".to_string(),
            title: "Test Article".to_string(),
            byline: Some("John Doe".to_string()),
            published_time: Some(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()),
            excerpt: "A brief excerpt.".to_string(),
            ..Default::default()
        };
        result.set_content("<p>This is the article content.</p>".to_string());

        let md = result.format_markdown();
        assert!(md.starts_with("# Test Article"));
        assert!(md.contains("By John Doe | 2024-06-15"));
        assert!(md.contains("Source: https://example.com/article"));
        assert!(md.contains("> A brief excerpt."));
        assert!(md.contains("---"));
        assert!(md.contains("This is the article content."));
    }

    #[test]
    fn render_by_content_type() {
        let mut result = ExtractionResult::default();
        result.set_content("<h2>Head</h2><p>Body</p>".to_string());
        assert_eq!(result.render(ContentType::Html), "<h2>Head</h2><p>Body</p>");
        assert_eq!(result.render(ContentType::Text), "Head\nBody");
        assert!(result.render(ContentType::Markdown).contains("## Head"));
    }
}
