// ABOUTME: Page fetching: the PageFetcher seam and its HTTP implementation.
// ABOUTME: Handles SSRF protection, the per-request deadline, size limits and charset decoding.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use once_cell::sync::Lazy;
use tracing::{debug, instrument};
use url::Url;

use crate::error::ExtractError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Ranges refused unless private networks are explicitly allowed.
static PRIVATE_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "0.0.0.0/8",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
});

/// A fetched, decoded page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    /// URL after redirects; used as the base for relative links.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub html: String,
    /// When the response body finished downloading.
    pub fetched_at: DateTime<Utc>,
}

/// Retrieves page markup for the orchestrator and the pagination crawler.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ExtractError>;
}

/// Fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    headers: HashMap<String, String>,
    allow_private_networks: bool,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            headers: HashMap::new(),
            allow_private_networks: false,
            timeout,
        }
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.allow_private_networks = allow;
        self
    }

    async fn fetch_inner(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        let parsed = parse_http_url(url, "Fetch")?;
        if !self.allow_private_networks {
            check_host(&parsed, url).await?;
        }

        let mut request = self.client.get(parsed.as_str());
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::timeout(url, "Fetch", Some(e.into()))
            } else {
                ExtractError::fetch(url, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
            }
        })?;

        if !self.allow_private_networks {
            check_host(response.url(), url).await?;
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_CONTENT_LENGTH {
                return Err(ExtractError::fetch(
                    url,
                    "Fetch",
                    Some(anyhow::anyhow!("content too large")),
                ));
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        if !(200..300).contains(&status) {
            return Err(ExtractError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("HTTP status {}", status)),
            ));
        }

        let body: Bytes = response.bytes().await.map_err(|e| {
            ExtractError::fetch(url, "Fetch", Some(anyhow::anyhow!("failed to read body: {}", e)))
        })?;
        if body.len() > MAX_CONTENT_LENGTH {
            return Err(ExtractError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            ));
        }

        let html = decode_body(&body, content_type.as_deref());
        debug!(status, bytes = body.len(), final_url = %final_url, "fetched page");
        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status,
            content_type,
            html,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        match tokio::time::timeout(self.timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractError::timeout(
                url,
                "Fetch",
                Some(anyhow::anyhow!("no response within {:?}", self.timeout)),
            )),
        }
    }
}

/// Parses an absolute http(s) URL.
pub fn parse_http_url(url: &str, op: &str) -> Result<Url, ExtractError> {
    if url.trim().is_empty() {
        return Err(ExtractError::invalid_url(url, op, None));
    }
    let parsed = Url::parse(url.trim()).map_err(|e| {
        ExtractError::invalid_url(url, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(ExtractError::invalid_url(
                url,
                op,
                Some(anyhow::anyhow!("scheme must be http or https")),
            ))
        }
    }
    if parsed.host_str().is_none() {
        return Err(ExtractError::invalid_url(
            url,
            op,
            Some(anyhow::anyhow!("missing host")),
        ));
    }
    Ok(parsed)
}

pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    PRIVATE_NETS.iter().any(|net| net.contains(addr))
}

/// Refuses hosts that are, or resolve to, private addresses.
async fn check_host(target: &Url, url: &str) -> Result<(), ExtractError> {
    let Some(host) = target.host_str() else {
        return Ok(());
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ExtractError::ssrf(
                url,
                "Fetch",
                Some(anyhow::anyhow!("private IP addresses are not allowed")),
            ));
        }
        return Ok(());
    }

    let port = target.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        ExtractError::fetch(url, "Fetch", Some(anyhow::anyhow!("DNS lookup failed: {}", e)))
    })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(ExtractError::ssrf(
                url,
                "Fetch",
                Some(anyhow::anyhow!("{} resolves to a private address", host)),
            ));
        }
    }
    Ok(())
}

/// Decodes body bytes using the content-type charset, or detection when absent.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|cs| encoding_rs::Encoding::for_label(cs.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type.to_lowercase().split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|cs| cs.trim_matches('"').trim_matches('\'').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(reqwest::Client::new(), Duration::from_secs(5)).allow_private_networks(true)
    }

    #[tokio::test]
    async fn fetches_and_decodes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/article").header("x-test", "1");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<p>hello</p>");
        });

        let mut headers = HashMap::new();
        headers.insert("x-test".to_string(), "1".to_string());
        let before = Utc::now();
        let page = fetcher()
            .headers(headers)
            .fetch_page(&server.url("/article"))
            .await
            .expect("fetch should succeed");
        mock.assert();
        assert_eq!(page.status, 200);
        assert_eq!(page.html, "<p>hello</p>");
        assert_eq!(page.final_url, server.url("/article"));
        assert!(page.fetched_at >= before && page.fetched_at <= Utc::now());
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found");
        });
        let err = fetcher()
            .fetch_page(&server.url("/gone"))
            .await
            .expect_err("404 should fail");
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500)).body("late");
        });
        let err = HttpFetcher::new(reqwest::Client::new(), Duration::from_millis(50))
            .allow_private_networks(true)
            .fetch_page(&server.url("/slow"))
            .await
            .expect_err("should time out");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn private_addresses_are_blocked() {
        let server = MockServer::start();
        let url = format!("http://127.0.0.1:{}/test", server.port());
        let err = HttpFetcher::new(reqwest::Client::new(), Duration::from_secs(5))
            .fetch_page(&url)
            .await
            .expect_err("should fail on private IP");
        assert!(err.is_ssrf());
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(parse_http_url("", "Fetch").unwrap_err().is_invalid_url());
        assert!(parse_http_url("ftp://example.com/x", "Fetch")
            .unwrap_err()
            .is_invalid_url());
        assert!(parse_http_url("not a url", "Fetch").unwrap_err().is_invalid_url());
        assert!(parse_http_url("https://example.com/a", "Fetch").is_ok());
    }

    #[test]
    fn private_ranges() {
        for ip in ["10.1.2.3", "172.16.0.1", "192.168.1.1", "127.0.0.1", "169.254.0.1", "::1", "fd00::1", "fe80::1"] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "172.32.0.1", "2001:4860:4860::8888"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn charset_handling() {
        assert_eq!(
            extract_charset("text/html; charset=\"ISO-8859-1\""),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
        let latin1: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        assert_eq!(decode_body(latin1, Some("text/html; charset=iso-8859-1")), "café");
    }
}
