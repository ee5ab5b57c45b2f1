// ABOUTME: Candidate extraction strategies: site-config rules, structured data, and generic scoring.
// ABOUTME: Also holds the body-only pass used for continuation pages.

//! Candidate extraction.
//!
//! Strategies, in their default priority:
//! - `site`: the resolved profile's location rules.
//! - `structured`: a JSON-LD article body rebuilt into paragraphs.
//! - `generic`: paragraph-density scoring.
//!
//! `fields` reads page-level metadata (title fallback, byline, dates, images).

pub mod fields;
pub mod generic;
pub mod site;
pub mod structured;

use dom_query::Document;
use tracing::debug;

use crate::directives::{DirectiveEngine, ShapedPage};
use crate::profiles::ExtractionProfile;
use crate::result::ExtractionMethod;

/// Generic body of a shaped page, finished with the profile's body-stage directives.
pub fn generic_on_shaped(
    engine: &DirectiveEngine,
    shaped: &ShapedPage,
    lead_image: Option<&str>,
    min_len: usize,
) -> Option<String> {
    let body = generic::extract_body(&shaped.doc.html(), min_len)?;
    Some(engine.finish_body(&body, shaped.body_stage(), lead_image))
}

/// Body of a continuation page, chosen the way page one's body was.
///
/// Title and byline come from page one, so only the body is read here.
pub fn page_body(
    engine: &DirectiveEngine,
    page: &Document,
    profile: &ExtractionProfile,
    method: ExtractionMethod,
) -> Option<String> {
    let shaped = match engine.shape_page(page, &profile.directives()) {
        Ok(shaped) => Some(shaped),
        Err(e) => {
            debug!(error = %e, "continuation page failed the guard");
            None
        }
    };

    match (method, shaped) {
        (ExtractionMethod::SiteConfig, Some(shaped)) => {
            site::body_from_rules(engine, &shaped, profile, None, 1).or_else(|| {
                profile
                    .autodetect_on_failure
                    .then(|| generic_on_shaped(engine, &shaped, None, 1))
                    .flatten()
            })
        }
        (ExtractionMethod::DomFallback, Some(shaped)) if profile.autodetect_on_failure => {
            generic_on_shaped(engine, &shaped, None, 1)
        }
        (ExtractionMethod::DomFallback, _) => generic::extract_body(&page.html(), 1),
        _ => None,
    }
}
