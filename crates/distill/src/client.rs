// ABOUTME: The extraction Client: sequences profile resolution, directives, strategies and pagination.
// ABOUTME: Provides async extract() and extract_html() returning an ExtractionResult or TotalExtractionFailure.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dom_query::Document;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::directives::DirectiveEngine;
use crate::dom::text::{block_text, text_len};
use crate::error::ExtractError;
use crate::extractors::fields::{excerpt, parse_date, PageMetadata};
use crate::extractors::structured::{self, StructuredArticle};
use crate::extractors::{generic, generic_on_shaped, site};
use crate::formats::{absolutize_urls, sanitize_html};
use crate::options::{ClientBuilder, Options};
use crate::pagination::{discover_links, Crawler, PageLinks};
use crate::profiles::{
    load_builtin_profiles, ConfigResolver, ExtractionProfile, HttpProfileSource, ProfileSource,
};
use crate::query::{QueryEvaluator, SelectorEvaluator};
use crate::resource::{is_private_ip, parse_http_url, HttpFetcher, PageFetcher};
use crate::result::{ExtractionMethod, ExtractionResult, Provenance};

/// Everything read from the first page before pagination.
struct FirstPage {
    method: ExtractionMethod,
    body: String,
    title: Option<String>,
    byline: Option<String>,
    published_time: Option<DateTime<Utc>>,
    structured: Option<StructuredArticle>,
    native_ad_clue: Option<String>,
    metadata: PageMetadata,
    links: PageLinks,
}

/// The extraction client.
///
/// Cheap to share: the profile cache is internal and every run captures its
/// own `Arc` of the profile it resolved.
pub struct Client {
    opts: Options,
    fetcher: Arc<dyn PageFetcher>,
    evaluator: Arc<dyn QueryEvaluator>,
    resolver: ConfigResolver,
}

impl Client {
    /// Create a new ClientBuilder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a new Client with the given options.
    pub fn new(opts: Options) -> Self {
        ClientBuilder::new().options(opts).build()
    }

    pub(crate) fn from_builder(builder: ClientBuilder) -> Self {
        let ClientBuilder {
            opts,
            fetcher,
            evaluator,
            profile_source,
        } = builder;

        let http_client = opts
            .http_client
            .clone()
            .unwrap_or_else(|| build_http_client(&opts));

        let fetcher = fetcher.unwrap_or_else(|| {
            Arc::new(
                HttpFetcher::new(http_client.clone(), opts.timeout)
                    .headers(opts.headers.clone())
                    .allow_private_networks(opts.allow_private_networks),
            )
        });
        let evaluator = evaluator.unwrap_or_else(|| Arc::new(SelectorEvaluator));

        let table = opts.profiles.clone().unwrap_or_else(load_builtin_profiles);
        let mut resolver = ConfigResolver::new(table);
        let source = profile_source.or_else(|| {
            opts.profile_base_url.as_ref().map(|base| {
                Arc::new(HttpProfileSource::new(http_client.clone(), base, opts.timeout))
                    as Arc<dyn ProfileSource>
            })
        });
        if let Some(source) = source {
            resolver = resolver.with_source(source, opts.profile_ttl);
        }

        Self {
            opts,
            fetcher,
            evaluator,
            resolver,
        }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// The profile resolver, for cache maintenance.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Fetch `url` and extract its article.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, url: &str) -> Result<ExtractionResult, ExtractError> {
        parse_http_url(url, "Extract")?;
        let page = self.fetcher.fetch_page(url).await?;
        let base = Url::parse(&page.final_url)
            .map_err(|e| ExtractError::invalid_url(&page.final_url, "Extract", Some(e.into())))?;
        self.run(&page.html, base, url, page.fetched_at).await
    }

    /// Extract the article from already-fetched markup.
    ///
    /// `url` is the page's address; it keys the profile lookup and resolves
    /// relative links. Continuation pages are still fetched when found.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract_html(
        &self,
        html: &str,
        url: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        let base = parse_http_url(url, "ExtractHtml")?;
        self.run(html, base, url, Utc::now()).await
    }

    async fn run(
        &self,
        html: &str,
        base: Url,
        source_url: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<ExtractionResult, ExtractError> {
        let host = base.host_str().unwrap_or_default().to_string();
        let profile = self.resolver.resolve(&host).await;
        if profile.is_none() {
            let miss = ExtractError::config_lookup_miss(base.as_str(), "ResolveProfile");
            debug!(host = %host, reason = %miss, "no site profile, using fallback strategies");
        }

        let html = match profile.as_deref() {
            Some(p) => p.preprocess(html),
            None => html.to_string(),
        };
        let first = self.first_page(&html, &base, profile.as_deref())?;

        let (body, page_count) = match profile.as_deref() {
            Some(p)
                if self.opts.follow_pagination
                    && first.method != ExtractionMethod::StructuredData
                    && self.opts.max_pages > 1 =>
            {
                let outcome = Crawler::new(&*self.fetcher, &*self.evaluator, p, first.method)
                    .max_pages(self.opts.max_pages)
                    .crawl(&base, first.body, first.links)
                    .await;
                (outcome.html, outcome.page_count)
            }
            _ => (first.body, 1),
        };

        let content = sanitize_html(&absolutize_urls(&body, &base));
        let structured = first.structured.as_ref();
        let metadata = first.metadata;

        let mut result = ExtractionResult {
            url: base.to_string(),
            title: first.title.or(metadata.title).unwrap_or_default(),
            byline: first
                .byline
                .or_else(|| structured.and_then(|a| a.author.clone()))
                .or(metadata.byline),
            published_time: first
                .published_time
                .or_else(|| {
                    structured
                        .and_then(|a| a.date_published.as_deref())
                        .and_then(parse_date)
                })
                .or(metadata.published_time),
            site_name: metadata
                .site_name
                .or_else(|| structured::site_name_or_host(structured, &base)),
            extraction_method: first.method,
            native_ad: first.native_ad_clue.is_some(),
            native_ad_clue: first.native_ad_clue,
            page_count,
            language: metadata.language,
            lead_image_url: metadata.lead_image_url,
            provenance: Provenance::new(source_url, &self.opts.user_agent, retrieved_at),
            ..Default::default()
        };
        result.set_content(content);

        if result.length < self.opts.min_content_length {
            warn!(length = result.length, "sanitized body fell below the minimum length");
            return Err(ExtractError::total_failure(base.as_str(), "Extract"));
        }

        result.excerpt = match (first.method, structured.and_then(|a| a.description.clone())) {
            (ExtractionMethod::StructuredData, Some(description)) => description,
            _ => excerpt(&result.text_content),
        };

        info!(
            method = %result.extraction_method,
            pages = result.page_count,
            length = result.length,
            "extraction complete"
        );
        Ok(result)
    }

    /// Runs the strategy chain on page one. Parsed documents stay inside this call.
    fn first_page(
        &self,
        html: &str,
        base: &Url,
        profile: Option<&ExtractionProfile>,
    ) -> Result<FirstPage, ExtractError> {
        let min_len = self.opts.min_content_length;
        let meta_doc = Html::parse_document(html);
        let metadata = PageMetadata::extract(&meta_doc, base);
        let page = Document::from(html);
        let engine = DirectiveEngine::new(&*self.evaluator, base.as_str());
        let lead_image = metadata.lead_image_url.clone();

        let skip_json_ld = profile.map_or(false, |p| p.skip_json_ld);
        let structured_first = profile.map_or(false, |p| p.prefer_json_ld) && !skip_json_ld;

        let mut chosen: Option<(ExtractionMethod, String)> = None;
        let mut structured_hit: Option<StructuredArticle> = None;

        if structured_first {
            if let Some((article, body)) = structured::extract_body(&meta_doc, min_len) {
                info!("structured data preferred by profile");
                chosen = Some((ExtractionMethod::StructuredData, body));
                structured_hit = Some(article);
            }
        }

        let mut site_out = None;
        if let Some(p) = profile {
            match site::extract(&engine, &page, p, lead_image.as_deref(), min_len) {
                Ok(found) => site_out = Some(found),
                Err(e) => debug!(error = %e, "site-config strategy aborted"),
            }
        }

        if chosen.is_none() {
            if let Some(body) = site_out.as_mut().and_then(|s| s.body.take()) {
                info!("site-config body chosen");
                chosen = Some((ExtractionMethod::SiteConfig, body));
            }
        }

        if chosen.is_none() && !skip_json_ld && !structured_first {
            if let Some((article, body)) = structured::extract_body(&meta_doc, min_len) {
                info!("structured-data body chosen");
                chosen = Some((ExtractionMethod::StructuredData, body));
                structured_hit = Some(article);
            }
        }

        if chosen.is_none() {
            let candidate = match (profile, site_out.as_ref()) {
                (Some(p), Some(s)) if p.autodetect_on_failure => {
                    generic_on_shaped(&engine, &s.shaped, lead_image.as_deref(), min_len)
                }
                _ => generic::extract_body(html, min_len),
            };
            match candidate {
                Some(body) if text_len(&block_text(&body)) >= min_len => {
                    info!("generic body chosen");
                    chosen = Some((ExtractionMethod::DomFallback, body));
                }
                Some(_) => {
                    let err = ExtractError::insufficient_content(base.as_str(), "Generic");
                    debug!(error = %err, "generic body too short");
                }
                None => debug!("generic strategy found no body"),
            }
        }

        let Some((method, body)) = chosen else {
            warn!("every strategy came up empty");
            return Err(ExtractError::total_failure(base.as_str(), "Extract"));
        };

        let links = match profile {
            Some(p) => discover_links(&page, p, &engine, base),
            None => PageLinks::default(),
        };
        let structured = match structured_hit {
            Some(article) => Some(article),
            None if !skip_json_ld => structured::articles(&meta_doc).into_iter().next(),
            None => None,
        };

        let (title, byline, published_time, native_ad_clue) = match site_out {
            Some(s) => (s.title, s.byline, s.published_time, s.shaped.native_ad_clue),
            None => (None, None, None, None),
        };

        Ok(FirstPage {
            method,
            body,
            title,
            byline,
            published_time,
            structured,
            native_ad_clue,
            metadata,
            links,
        })
    }
}

/// Builds the default HTTP client, refusing redirects into private networks.
fn build_http_client(opts: &Options) -> reqwest::Client {
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= 10 {
            return attempt.error("too many redirects");
        }
        let next = attempt.url().clone();
        if !allow_private {
            if let Some(host) = next.host_str() {
                let host = host.trim_start_matches('[').trim_end_matches(']');
                let port = next.port_or_known_default().unwrap_or(80);
                if let Ok(ip) = host.parse::<std::net::IpAddr>() {
                    if is_private_ip(&ip) {
                        return attempt.error("redirect to private IP blocked");
                    }
                } else {
                    // synchronous DNS resolution to avoid async in redirect policy
                    match (host, port).to_socket_addrs() {
                        Ok(addrs) => {
                            for sa in addrs {
                                if is_private_ip(&sa.ip()) {
                                    return attempt.error("redirect to private IP blocked");
                                }
                            }
                        }
                        Err(_) => return attempt.error("DNS lookup failed during redirect"),
                    }
                }
            }
        }
        attempt.follow()
    });

    match reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "falling back to a default HTTP client");
            reqwest::Client::new()
        }
    }
}
