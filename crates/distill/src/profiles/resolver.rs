// ABOUTME: Config Resolver: maps a page hostname to an optional extraction profile.
// ABOUTME: Exact-match lookup after stripping `www.`, over built-ins plus a TTL cache of remote profiles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::profile::{normalize_host, ExtractionProfile, ProfileTable};
use super::remote::ProfileSource;
use crate::query::compiled::precompile_rules;

#[derive(Clone)]
struct CacheEntry {
    profile: Option<Arc<ExtractionProfile>>,
    fetched_at: Instant,
}

/// Resolves hostnames to profiles.
///
/// Resolved profiles are handed out as `Arc`s: a run captures one and keeps
/// using it even if the cache entry is refreshed or evicted while it runs.
pub struct ConfigResolver {
    builtin: HashMap<String, Arc<ExtractionProfile>>,
    source: Option<Arc<dyn ProfileSource>>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl ConfigResolver {
    /// Creates a resolver over a read-only built-in table.
    pub fn new(builtin: ProfileTable) -> Self {
        let builtin = builtin
            .iter()
            .map(|(host, profile)| (host.clone(), Arc::new(profile.clone())))
            .collect();
        Self {
            builtin,
            source: None,
            ttl: Duration::from_secs(24 * 60 * 60),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a remote source whose answers are cached for `ttl`.
    pub fn with_source(mut self, source: Arc<dyn ProfileSource>, ttl: Duration) -> Self {
        self.source = Some(source);
        self.ttl = ttl;
        self
    }

    /// Looks up the built-in table and the fresh part of the cache only.
    pub fn resolve_cached(&self, host: &str) -> Option<Arc<ExtractionProfile>> {
        let key = normalize_host(host);
        if let Some(profile) = self.builtin.get(&key) {
            return Some(profile.clone());
        }
        self.fresh_entry(&key).and_then(|e| e.profile)
    }

    /// Resolves a hostname, consulting the remote source on a cache miss.
    ///
    /// `None` is the normal "no profile" answer that sends extraction to the
    /// structured-data and generic strategies.
    pub async fn resolve(&self, host: &str) -> Option<Arc<ExtractionProfile>> {
        let key = normalize_host(host);
        if key.is_empty() {
            return None;
        }
        if let Some(profile) = self.builtin.get(&key) {
            debug!(host = %key, "using built-in profile");
            return Some(profile.clone());
        }
        if let Some(entry) = self.fresh_entry(&key) {
            debug!(host = %key, hit = entry.profile.is_some(), "profile cache hit");
            return entry.profile;
        }
        let source = self.source.as_ref()?;

        let profile = match source.fetch_profile(&key).await {
            Ok(Some(mut profile)) => {
                profile.host = key.clone();
                info!(host = %key, "fetched remote profile");
                for err in precompile_rules(profile.all_rules()) {
                    warn!(host = %key, error = %err, "profile rule will be skipped");
                }
                Some(Arc::new(profile))
            }
            Ok(None) => {
                debug!(host = %key, "no remote profile");
                None
            }
            Err(e) => {
                warn!(host = %key, error = %e, "remote profile lookup failed");
                None
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            key,
            CacheEntry {
                profile: profile.clone(),
                fetched_at: Instant::now(),
            },
        );
        profile
    }

    /// Drops every cached remote answer.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn fresh_entry(&self, key: &str) -> Option<CacheEntry> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .cloned()
    }
}
