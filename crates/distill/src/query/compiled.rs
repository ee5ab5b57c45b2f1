// ABOUTME: Cache of compiled location rules keyed by the rule string.
// ABOUTME: Rules compile once (XPath subset or CSS) and the matcher is reused across pages and runs.

//! Compiled rule caching.
//!
//! Profiles evaluate the same handful of rules on every page of every run.
//! Compilation results, including failures, are cached so a malformed rule is
//! diagnosed once and then rejected cheaply.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dom_query::Matcher;
use once_cell::sync::Lazy;

use super::xpath::{compile, looks_like_xpath};
use super::RuleError;

/// One union branch with its selector compiled.
#[derive(Clone)]
pub struct CompiledBranch {
    pub css: String,
    pub matcher: Matcher,
    pub attr: Option<String>,
}

/// A fully compiled location rule.
#[derive(Clone)]
pub struct CompiledRule {
    pub branches: Vec<CompiledBranch>,
}

type CacheEntry = Result<Arc<CompiledRule>, RuleError>;

/// Upper bound on cached rules. Reaching it empties the cache before the next insert.
const MAX_CACHED_RULES: usize = 512;

/// Rule string to compile outcome, cleared once it reaches its capacity.
struct RuleCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl RuleCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn get_or_compile(&self, rule: &str) -> CacheEntry {
        {
            let cache = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(rule) {
                return cached.clone();
            }
        }

        let compiled = compile_rule(rule).map(Arc::new);
        let mut cache = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(rule) {
            return cached.clone();
        }
        if cache.len() >= self.capacity {
            tracing::debug!(entries = cache.len(), "rule cache full; clearing");
            cache.clear();
        }
        cache.insert(rule.to_string(), compiled.clone());
        compiled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

static RULE_CACHE: Lazy<RuleCache> = Lazy::new(|| RuleCache::new(MAX_CACHED_RULES));

/// Gets or compiles a rule, caching the outcome.
pub fn get_or_compile(rule: &str) -> CacheEntry {
    RULE_CACHE.get_or_compile(rule)
}

/// Precompiles a batch of rules into the cache.
///
/// Called when a profile is resolved so that every rule of the run is
/// diagnosed up front.
pub fn precompile_rules<I, S>(rules: I) -> Vec<RuleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rules
        .into_iter()
        .filter_map(|r| get_or_compile(r.as_ref()).err())
        .collect()
}

fn compile_rule(rule: &str) -> Result<CompiledRule, RuleError> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(RuleError::Empty);
    }
    let css_branches = if looks_like_xpath(trimmed) {
        compile(trimmed)?
    } else {
        vec![super::xpath::CssBranch {
            css: trimmed.to_string(),
            attr: None,
        }]
    };

    let mut branches = Vec::with_capacity(css_branches.len());
    for branch in css_branches {
        let matcher = Matcher::new(&branch.css).map_err(|_| RuleError::InvalidSelector {
            rule: rule.to_string(),
            css: branch.css.clone(),
        })?;
        branches.push(CompiledBranch {
            css: branch.css,
            matcher,
            attr: branch.attr,
        });
    }
    Ok(CompiledRule { branches })
}
