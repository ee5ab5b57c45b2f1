// ABOUTME: Location-rule evaluation: the QueryEvaluator seam, match results and the default evaluator.
// ABOUTME: Rules resolve against a dom_query Document to zero, one or many nodes or attribute values.

pub mod compiled;
pub mod xpath;

use dom_query::{Document, NodeRef};

use crate::dom::text::normalize_whitespace;

/// A location rule that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("empty rule")]
    Empty,
    #[error("unsupported rule `{rule}`: {reason}")]
    Unsupported { rule: String, reason: String },
    #[error("rule `{rule}` compiled to invalid selector `{css}`")]
    InvalidSelector { rule: String, css: String },
}

/// One result of evaluating a location rule.
#[derive(Clone)]
pub enum Match<'a> {
    Node(NodeRef<'a>),
    Attr {
        owner: NodeRef<'a>,
        name: String,
        value: String,
    },
}

impl<'a> Match<'a> {
    /// The matched element, or the element owning the matched attribute.
    pub fn node(&self) -> &NodeRef<'a> {
        match self {
            Match::Node(n) => n,
            Match::Attr { owner, .. } => owner,
        }
    }

    pub fn is_attr(&self) -> bool {
        matches!(self, Match::Attr { .. })
    }

    /// The attribute value, or the node's whitespace-normalized text.
    pub fn value(&self) -> String {
        match self {
            Match::Node(n) => normalize_whitespace(&n.text()),
            Match::Attr { value, .. } => value.trim().to_string(),
        }
    }
}

/// Resolves profile rule strings against a document.
pub trait QueryEvaluator: Send + Sync {
    fn evaluate<'a>(&self, rule: &str, doc: &'a Document) -> Result<Vec<Match<'a>>, RuleError>;

    /// True when the rule resolves to at least one match.
    fn matches(&self, rule: &str, doc: &Document) -> Result<bool, RuleError> {
        Ok(!self.evaluate(rule, doc)?.is_empty())
    }
}

/// Default evaluator: the XPath subset compiled to CSS, or plain CSS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorEvaluator;

impl QueryEvaluator for SelectorEvaluator {
    fn evaluate<'a>(&self, rule: &str, doc: &'a Document) -> Result<Vec<Match<'a>>, RuleError> {
        let compiled = compiled::get_or_compile(rule)?;
        let mut out = Vec::new();
        for branch in &compiled.branches {
            let selection = doc.select_matcher(&branch.matcher);
            for node in selection.nodes() {
                match branch.attr {
                    Some(ref name) => {
                        if let Some(value) = node.attr(name) {
                            out.push(Match::Attr {
                                owner: node.clone(),
                                name: name.clone(),
                                value: value.to_string(),
                            });
                        }
                    }
                    None => out.push(Match::Node(node.clone())),
                }
            }
        }
        Ok(out)
    }
}
