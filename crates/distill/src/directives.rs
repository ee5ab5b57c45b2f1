// ABOUTME: Directive Engine: applies a profile's ordered cleaning directives to a private page clone.
// ABOUTME: Guards may abort the site-config path; malformed rules are logged and skipped.

//! The directive engine.
//!
//! Directives run in two stages:
//!
//! 1. [`DirectiveEngine::shape_page`] clones the page and applies everything
//!    from the guard through native-ad detection. Guard and native-ad rules
//!    are read against the untouched page; shaping mutates only the clone.
//! 2. [`DirectiveEngine::finish_body`] runs after a body has been chosen:
//!    lead-image insertion and post-processing attribute pruning.
//!
//! Removal, unwrap and attribute-prune directives are set-like, so applying
//! a directive list twice yields the same tree as applying it once.

use dom_query::{Document, Matcher, NodeRef, Selection};
use tracing::{debug, instrument, warn};

use crate::dom::brs::brs_to_ps;
use crate::dom::text::escape_html;
use crate::error::ExtractError;
use crate::profiles::Directive;
use crate::query::{Match, QueryEvaluator};

/// A private, shaped clone of a page.
pub struct ShapedPage {
    pub doc: Document,
    /// The first native-ad clue rule that matched, if any.
    pub native_ad_clue: Option<String>,
    body_stage: Vec<Directive>,
}

impl ShapedPage {
    pub fn is_native_ad(&self) -> bool {
        self.native_ad_clue.is_some()
    }

    /// Directives still to run once a body is chosen.
    pub fn body_stage(&self) -> &[Directive] {
        &self.body_stage
    }
}

/// Applies directive lists through an injected rule evaluator.
pub struct DirectiveEngine<'e> {
    evaluator: &'e dyn QueryEvaluator,
    url: String,
}

impl<'e> DirectiveEngine<'e> {
    pub fn new(evaluator: &'e dyn QueryEvaluator, url: impl Into<String>) -> Self {
        Self {
            evaluator,
            url: url.into(),
        }
    }

    pub fn evaluator(&self) -> &'e dyn QueryEvaluator {
        self.evaluator
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Clones `page` and applies the page-stage directives to the clone.
    ///
    /// Returns a `GuardFailure` error when a required marker has no match.
    #[instrument(skip_all, fields(url = %self.url))]
    pub fn shape_page(
        &self,
        page: &Document,
        directives: &[Directive],
    ) -> Result<ShapedPage, ExtractError> {
        let page_html = page.html().to_string();
        let doc = Document::from(page_html.as_str());
        let mut native_ad_clue = None;
        let mut body_stage = Vec::new();

        for directive in directives {
            if directive.is_body_stage() {
                body_stage.push(directive.clone());
                continue;
            }
            match directive {
                Directive::Guard(rules) => {
                    if !self.guard_satisfied(rules, page, &page_html) {
                        debug!("guard not satisfied, site-config path aborted");
                        return Err(ExtractError::guard_failure(&self.url, "ShapePage"));
                    }
                }
                Directive::Strip(rules) => self.strip(&doc, rules),
                Directive::StripIdOrClass(needles) => strip_id_or_class(&doc, needles),
                Directive::StripImageSrc(needles) => strip_image_src(&doc, needles),
                Directive::StripAttr(rules) => self.strip_attr(&doc, rules, directive.name()),
                Directive::Dissolve(rules) => self.dissolve(&doc, rules),
                Directive::StripComments => strip_comments(&doc),
                Directive::PromoteLazyImages(attrs) => promote_lazy_images(&doc, attrs),
                Directive::DoubleBrToParagraphs => double_br_to_paragraphs(&doc),
                Directive::NativeAdClue(rules) => {
                    if native_ad_clue.is_none() {
                        native_ad_clue = self.first_matching(rules, page, &page_html);
                        if let Some(ref clue) = native_ad_clue {
                            debug!(clue = %clue, "native ad clue matched");
                        }
                    }
                }
                Directive::InsertDetectedImage | Directive::PostStripAttr(_) => {}
            }
        }

        Ok(ShapedPage {
            doc,
            native_ad_clue,
            body_stage,
        })
    }

    /// Applies the body-stage directives to a chosen body fragment.
    pub fn finish_body(
        &self,
        body_html: &str,
        body_stage: &[Directive],
        lead_image: Option<&str>,
    ) -> String {
        if body_stage.is_empty() {
            return body_html.to_string();
        }
        let doc = Document::from(body_html);
        for directive in body_stage {
            match directive {
                Directive::InsertDetectedImage => {
                    if let Some(url) = lead_image {
                        insert_lead_image(&doc, url);
                    }
                }
                Directive::PostStripAttr(rules) => self.strip_attr(&doc, rules, directive.name()),
                other => debug!(directive = other.name(), "not a body-stage directive"),
            }
        }
        body_inner_html(&doc)
    }

    /// Evaluates a rule, logging and swallowing malformed rules.
    pub fn evaluate_rule<'a>(
        &self,
        rule: &str,
        doc: &'a Document,
        directive: &str,
    ) -> Vec<Match<'a>> {
        match self.evaluator.evaluate(rule, doc) {
            Ok(matches) => matches,
            Err(e) => {
                let err = ExtractError::rule_evaluation(&self.url, directive, Some(e.into()));
                warn!(rule, error = %err, "skipping malformed rule");
                Vec::new()
            }
        }
    }

    /// True when the rule matches, or for rules that cannot be evaluated,
    /// when the rule text occurs literally in the page markup.
    fn page_contains(&self, rule: &str, page: &Document, page_html: &str) -> bool {
        match self.evaluator.matches(rule, page) {
            Ok(found) => found,
            Err(e) => {
                debug!(rule, error = %e, "falling back to literal marker search");
                page_html.contains(rule)
            }
        }
    }

    fn guard_satisfied(&self, rules: &[String], page: &Document, page_html: &str) -> bool {
        rules
            .iter()
            .all(|rule| self.page_contains(rule, page, page_html))
    }

    fn first_matching(&self, rules: &[String], page: &Document, page_html: &str) -> Option<String> {
        rules
            .iter()
            .find(|rule| self.page_contains(rule, page, page_html))
            .cloned()
    }

    fn strip(&self, doc: &Document, rules: &[String]) {
        for rule in rules {
            let matches = self.evaluate_rule(rule, doc, "strip");
            debug!(rule, count = matches.len(), "strip");
            for m in matches {
                Selection::from(m.node().clone()).remove();
            }
        }
    }

    fn strip_attr(&self, doc: &Document, rules: &[String], directive: &str) {
        for rule in rules {
            for m in self.evaluate_rule(rule, doc, directive) {
                match m {
                    Match::Attr { owner, name, .. } => {
                        Selection::from(owner).remove_attr(&name);
                    }
                    Match::Node(_) => {
                        warn!(rule, directive, "rule selects elements, not an attribute");
                        break;
                    }
                }
            }
        }
    }

    fn dissolve(&self, doc: &Document, rules: &[String]) {
        for rule in rules {
            let nodes: Vec<NodeRef> = self
                .evaluate_rule(rule, doc, "dissolve")
                .iter()
                .map(|m| m.node().clone())
                .collect();
            // Innermost first, so an outer match sees its children already unwrapped.
            for node in nodes.into_iter().rev() {
                let sel = Selection::from(node);
                let inner = sel.inner_html();
                sel.replace_with_html(inner);
            }
        }
    }
}

fn body_inner_html(doc: &Document) -> String {
    doc.select("body").inner_html().to_string()
}

/// Builds `[attr*="needle"]` alternatives over the given attributes.
fn contains_selector(attrs: &[&str], tag: &str, needle: &str) -> Option<Matcher> {
    let needle = needle.trim().trim_matches(|c| c == '"' || c == '\'');
    if needle.is_empty() {
        return None;
    }
    let quoted = needle.replace('\\', "\\\\").replace('"', "\\\"");
    let css = attrs
        .iter()
        .map(|a| format!("{}[{}*=\"{}\"]", tag, a, quoted))
        .collect::<Vec<_>>()
        .join(", ");
    let matcher = match Matcher::new(&css) {
        Ok(m) => Some(m),
        Err(_) => {
            warn!(needle, "could not build selector for substring rule");
            None
        }
    };
    matcher
}

fn strip_id_or_class(doc: &Document, needles: &[String]) {
    for needle in needles {
        if let Some(m) = contains_selector(&["class", "id"], "", needle) {
            doc.select_matcher(&m).remove();
        }
    }
}

fn strip_image_src(doc: &Document, needles: &[String]) {
    for needle in needles {
        if let Some(m) = contains_selector(&["src"], "img", needle) {
            doc.select_matcher(&m).remove();
        }
    }
}

/// Returns true if an element's class or id, or any descendant's, contains a needle.
pub fn has_excluded_id_or_class(node: &NodeRef, needles: &[String]) -> bool {
    let own = |n: &NodeRef| {
        let class = n.attr("class").map(|v| v.to_string()).unwrap_or_default();
        let id = n.attr("id").map(|v| v.to_string()).unwrap_or_default();
        needles.iter().any(|needle| {
            let needle = needle.trim().trim_matches(|c| c == '"' || c == '\'');
            !needle.is_empty() && (class.contains(needle) || id.contains(needle))
        })
    };
    if own(node) {
        return true;
    }
    let sel = Selection::from(node.clone());
    needles.iter().any(|needle| {
        contains_selector(&["class", "id"], "", needle)
            .map(|m| sel.select_matcher(&m).exists())
            .unwrap_or(false)
    })
}

fn strip_comments(doc: &Document) {
    let comments: Vec<NodeRef> = doc
        .root()
        .descendants()
        .into_iter()
        .filter(|n| n.is_comment())
        .collect();
    debug!(count = comments.len(), "strip_comments");
    for comment in comments {
        comment.remove_from_parent();
    }
}

fn promote_lazy_images(doc: &Document, attrs: &[String]) {
    let mut promoted = 0usize;
    for img in doc.select("img").iter() {
        let value = attrs.iter().find_map(|a| {
            img.attr(a)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });
        if let Some(value) = value {
            img.set_attr("src", &value);
            for a in attrs {
                if a != "src" {
                    img.remove_attr(a);
                }
            }
            promoted += 1;
        }
    }
    debug!(promoted, "src_lazy_load_attr");
}

fn double_br_to_paragraphs(doc: &Document) {
    let mut parents: Vec<NodeRef> = Vec::new();
    for br in doc.select("br").nodes() {
        if let Some(parent) = br.parent() {
            if !parents.iter().any(|p| p.id == parent.id) {
                parents.push(parent);
            }
        }
    }
    for parent in parents.into_iter().rev() {
        let is_paragraph = parent.node_name().as_deref() == Some("p");
        let sel = Selection::from(parent);
        if let Some(html) = brs_to_ps(&sel.inner_html()) {
            if is_paragraph {
                sel.replace_with_html(html);
            } else {
                sel.set_html(html);
            }
        }
    }
}

fn insert_lead_image(doc: &Document, url: &str) {
    if doc.select("img").exists() {
        return;
    }
    let body = doc.select("body");
    let figure = format!("<figure><img src=\"{}\"></figure>", escape_html(url));
    let html = format!("{}{}", figure, body.inner_html());
    body.set_html(html);
}
