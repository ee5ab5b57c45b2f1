// ABOUTME: Configuration options for the extraction client including ContentType, Options, and ClientBuilder.
// ABOUTME: ClientBuilder provides a fluent API and accepts replacement fetch, query and profile collaborators.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::pagination::DEFAULT_MAX_PAGES;
use crate::profiles::{ProfileSource, ProfileTable};
use crate::query::QueryEvaluator;
use crate::resource::PageFetcher;

/// Default minimum body length, in characters of plain text.
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 500;

/// The content type format for rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Html,
    Markdown,
    Text,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentType::Html => "html",
            ContentType::Markdown => "markdown",
            ContentType::Text => "text",
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for ContentType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => ContentType::Markdown,
            "text" | "txt" => ContentType::Text,
            _ => ContentType::Html,
        }
    }
}

/// Configuration options for the extraction client.
#[derive(Debug, Clone)]
pub struct Options {
    /// Deadline for each page fetch.
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub content_type: ContentType,
    pub min_content_length: usize,
    pub max_pages: usize,
    pub follow_pagination: bool,
    /// Base URL of the remote site-config service.
    pub profile_base_url: Option<String>,
    pub profile_ttl: Duration,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
    /// Replaces the embedded profile table.
    pub profiles: Option<ProfileTable>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Distill/1.0".to_string(),
            allow_private_networks: false,
            content_type: ContentType::Html,
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            max_pages: DEFAULT_MAX_PAGES,
            follow_pagination: true,
            profile_base_url: None,
            profile_ttl: Duration::from_secs(24 * 60 * 60),
            http_client: None,
            headers: HashMap::new(),
            profiles: None,
        }
    }
}

/// Builder for constructing Client instances with custom configuration.
#[derive(Clone, Default)]
pub struct ClientBuilder {
    pub(crate) opts: Options,
    pub(crate) fetcher: Option<Arc<dyn PageFetcher>>,
    pub(crate) evaluator: Option<Arc<dyn QueryEvaluator>>,
    pub(crate) profile_source: Option<Arc<dyn ProfileSource>>,
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options.
    pub fn options(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    /// Set the per-page fetch timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header. It also becomes the provenance client id.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Set the content type for rendered output.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.opts.content_type = content_type;
        self
    }

    /// Minimum plain-text length a body must reach.
    pub fn min_content_length(mut self, len: usize) -> Self {
        self.opts.min_content_length = len;
        self
    }

    /// Upper bound on pages per article, the first page included.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.opts.max_pages = max_pages;
        self
    }

    /// Enable or disable following next-page links.
    pub fn follow_pagination(mut self, follow: bool) -> Self {
        self.opts.follow_pagination = follow;
        self
    }

    /// Consult a remote site-config service for hosts missing from the table.
    pub fn profile_service(mut self, base_url: impl Into<String>) -> Self {
        self.opts.profile_base_url = Some(base_url.into());
        self
    }

    /// How long remote profile answers stay cached.
    pub fn profile_ttl(mut self, ttl: Duration) -> Self {
        self.opts.profile_ttl = ttl;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the embedded profile table.
    pub fn profiles(mut self, table: ProfileTable) -> Self {
        self.opts.profiles = Some(table);
        self
    }

    /// Replace the page-fetch primitive used for every page.
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace the location-rule evaluator.
    pub fn evaluator(mut self, evaluator: Arc<dyn QueryEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Replace the remote profile source.
    pub fn profile_source(mut self, source: Arc<dyn ProfileSource>) -> Self {
        self.profile_source = Some(source);
        self
    }

    /// Build the Client with the configured options.
    pub fn build(self) -> Client {
        Client::from_builder(self)
    }
}
