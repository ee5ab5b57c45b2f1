// ABOUTME: Site-config strategy: evaluates a profile's title, body, author and date rules.
// ABOUTME: Body candidates pass the skip_id_or_class filter and the minimum length; the first passing rule wins.

use chrono::{DateTime, Utc};
use dom_query::{Document, NodeRef, Selection};
use tracing::{debug, info};

use crate::directives::{has_excluded_id_or_class, DirectiveEngine, ShapedPage};
use crate::dom::text::{block_text, text_len};
use crate::error::ExtractError;
use crate::extractors::fields::parse_date;
use crate::profiles::ExtractionProfile;
use crate::query::Match;

/// Everything the site-config strategy read from one page.
pub struct SiteExtraction {
    pub title: Option<String>,
    /// Finished body markup, when a body rule produced one.
    pub body: Option<String>,
    pub byline: Option<String>,
    pub published_time: Option<DateTime<Utc>>,
    /// The shaped page, for fallbacks that should see the profile's cleaning.
    pub shaped: ShapedPage,
}

/// Runs the site-config strategy against `page`.
///
/// Field rules read the untouched page; body rules read the shaped clone.
/// A guard miss is returned as `GuardFailure`.
pub fn extract(
    engine: &DirectiveEngine,
    page: &Document,
    profile: &ExtractionProfile,
    lead_image: Option<&str>,
    min_len: usize,
) -> Result<SiteExtraction, ExtractError> {
    let shaped = engine.shape_page(page, &profile.directives())?;

    let title = first_value(engine, &profile.title, page, "title");
    let byline = joined_values(engine, &profile.author, page);
    let published_time = profile.date.iter().find_map(|rule| {
        engine
            .evaluate_rule(rule, page, "date")
            .iter()
            .find_map(|m| parse_date(&m.value()))
    });
    let body = body_from_rules(engine, &shaped, profile, lead_image, min_len);
    if body.is_some() {
        info!(host = %profile.host, "site-config body found");
    }

    Ok(SiteExtraction {
        title,
        body,
        byline,
        published_time,
        shaped,
    })
}

/// Tries each body rule in order against a shaped page.
pub fn body_from_rules(
    engine: &DirectiveEngine,
    shaped: &ShapedPage,
    profile: &ExtractionProfile,
    lead_image: Option<&str>,
    min_len: usize,
) -> Option<String> {
    for rule in &profile.body {
        let nodes: Vec<NodeRef> = engine
            .evaluate_rule(rule, &shaped.doc, "body")
            .into_iter()
            .filter_map(|m| match m {
                Match::Node(n) => Some(n),
                Match::Attr { .. } => None,
            })
            .collect();
        if nodes.is_empty() {
            debug!(rule = %rule, "body rule matched nothing");
            continue;
        }
        if nodes
            .iter()
            .any(|n| has_excluded_id_or_class(n, &profile.skip_id_or_class))
        {
            debug!(rule = %rule, "body candidate excluded by skip_id_or_class");
            continue;
        }

        let html = match nodes.as_slice() {
            [single] => Selection::from(single.clone()).inner_html().to_string(),
            many => many
                .iter()
                .map(|n| Selection::from(n.clone()).html().to_string())
                .collect::<String>(),
        };
        let finished = engine.finish_body(&html, shaped.body_stage(), lead_image);
        let len = text_len(&block_text(&finished));
        if len < min_len {
            let err = ExtractError::insufficient_content(engine.url(), "SiteConfigBody");
            debug!(rule = %rule, len, min_len, error = %err, "body candidate rejected");
            continue;
        }
        debug!(rule = %rule, count = nodes.len(), len, "body rule accepted");
        return Some(finished);
    }
    None
}

fn first_value(
    engine: &DirectiveEngine,
    rules: &[String],
    doc: &Document,
    field: &str,
) -> Option<String> {
    rules.iter().find_map(|rule| {
        engine
            .evaluate_rule(rule, doc, field)
            .iter()
            .map(|m| m.value())
            .find(|v| !v.is_empty())
    })
}

/// Values of the first author rule that matches, joined with ", ".
fn joined_values(engine: &DirectiveEngine, rules: &[String], doc: &Document) -> Option<String> {
    for rule in rules {
        let mut values: Vec<String> = Vec::new();
        for m in engine.evaluate_rule(rule, doc, "author") {
            let v = m.value();
            if !v.is_empty() && !values.contains(&v) {
                values.push(v);
            }
        }
        if !values.is_empty() {
            return Some(values.join(", "));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SelectorEvaluator;

    fn long_text(tag: &str) -> String {
        format!("{} body text that goes on for a while. ", tag).repeat(6)
    }

    #[test]
    fn picks_non_excluded_candidate() {
        let html = format!(
            r#"<html><head><meta property="og:title" content="Meta Title"></head><body>
            <div class="story promo-box"><p>{}</p></div>
            <div class="story"><p>{}</p></div>
            </body></html>"#,
            long_text("Excluded"),
            long_text("Kept")
        );
        let page = Document::from(html.as_str());
        let profile = ExtractionProfile {
            title: vec!["//meta[@property='og:title']/@content".into()],
            body: vec!["//div[contains(@class, 'promo-box')]".into(), "//div[@class='story']".into()],
            skip_id_or_class: vec!["promo".into()],
            ..Default::default()
        };
        let engine = DirectiveEngine::new(&SelectorEvaluator, "https://example.com/a");
        let out = extract(&engine, &page, &profile, None, 100).unwrap();
        assert_eq!(out.title.as_deref(), Some("Meta Title"));
        let body = out.body.expect("body");
        assert!(body.contains("Kept body"));
        assert!(!body.contains("Excluded"));
    }

    #[test]
    fn multiple_matches_are_combined() {
        let html = format!(
            "<html><body><section class='part'><p>{}</p></section><section class='part'><p>{}</p></section></body></html>",
            long_text("First"),
            long_text("Second")
        );
        let page = Document::from(html.as_str());
        let profile = ExtractionProfile {
            body: vec!["//section[@class='part']".into()],
            insert_detected_image: false,
            ..Default::default()
        };
        let engine = DirectiveEngine::new(&SelectorEvaluator, "u");
        let body = extract(&engine, &page, &profile, None, 100).unwrap().body.unwrap();
        assert!(body.starts_with("<section class=\"part\">"));
        assert!(body.contains("First") && body.contains("Second"));
    }

    #[test]
    fn short_candidates_fall_through() {
        let page = Document::from("<html><body><article><p>Too short.</p></article></body></html>");
        let profile = ExtractionProfile {
            body: vec!["//article".into()],
            ..Default::default()
        };
        let engine = DirectiveEngine::new(&SelectorEvaluator, "u");
        let out = extract(&engine, &page, &profile, None, 500).unwrap();
        assert!(out.body.is_none());
        assert!(out.shaped.doc.html().contains("Too short."));
    }

    #[test]
    fn author_and_date_rules() {
        let page = Document::from(
            r#"<html><body><a class="author">Ann</a><a class="author">Bob</a><a class="author">Ann</a>
            <span class="when">2024-03-05T08:00:00Z</span></body></html>"#,
        );
        let profile = ExtractionProfile {
            author: vec!["//a[@class='author']".into()],
            date: vec!["//span[@class='when']".into()],
            ..Default::default()
        };
        let engine = DirectiveEngine::new(&SelectorEvaluator, "u");
        let out = extract(&engine, &page, &profile, None, 500).unwrap();
        assert_eq!(out.byline.as_deref(), Some("Ann, Bob"));
        assert_eq!(
            out.published_time.map(|d| d.to_rfc3339()),
            Some("2024-03-05T08:00:00+00:00".to_string())
        );
    }

    #[test]
    fn guard_miss_is_an_error() {
        let page = Document::from("<html><body><p>x</p></body></html>");
        let profile = ExtractionProfile {
            if_page_contains: vec!["//div[@id='article']".into()],
            body: vec!["//p".into()],
            ..Default::default()
        };
        let engine = DirectiveEngine::new(&SelectorEvaluator, "u");
        let err = extract(&engine, &page, &profile, None, 1).err().unwrap();
        assert!(err.is_guard_failure());
    }
}
