// ABOUTME: Remote profile source: fetches per-host profiles from a site-config service over HTTP.
// ABOUTME: Defines the ProfileSource seam and HttpProfileSource for `GET {base}/site-config/{host}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::profile::ExtractionProfile;
use crate::error::ExtractError;

/// Supplies profiles that are not in the built-in table.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Returns `Ok(None)` when the source has no profile for the host.
    async fn fetch_profile(&self, host: &str) -> Result<Option<ExtractionProfile>, ExtractError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    config: Option<ExtractionProfile>,
}

/// Profile source backed by the site-config HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProfileSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProfileSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    fn endpoint(&self, host: &str) -> String {
        format!("{}/site-config/{}", self.base_url, host)
    }
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    async fn fetch_profile(&self, host: &str) -> Result<Option<ExtractionProfile>, ExtractError> {
        let url = self.endpoint(host);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::timeout(&url, "FetchProfile", Some(e.into()))
                } else {
                    ExtractError::fetch(&url, "FetchProfile", Some(e.into()))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(host, "profile service has no profile");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ExtractError::fetch(
                &url,
                "FetchProfile",
                Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
            ));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| ExtractError::fetch(&url, "FetchProfile", Some(e.into())))?;
        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope.config.filter(|p| !p.body.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn source(server: &MockServer) -> HttpProfileSource {
        HttpProfileSource::new(
            reqwest::Client::new(),
            format!("{}/", server.base_url()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn fetches_profile_envelope() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/site-config/example.com");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"success":true,"hostname":"example.com","config":{
                        "body":["//article"],"title":["//h1"],"tidy":null,
                        "htmlPreprocessing":[{"find":"<section","replace":"<div"}]
                    }}"#,
                );
        });

        let profile = source(&server)
            .fetch_profile("example.com")
            .await
            .expect("request succeeds")
            .expect("profile present");
        mock.assert();
        assert_eq!(profile.body, vec!["//article"]);
        assert_eq!(profile.html_preprocessing.len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_a_miss() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/site-config/unknown.org");
            then.status(404)
                .body(r#"{"success":false,"message":"No configuration found"}"#);
        });

        let result = source(&server).fetch_profile("unknown.org").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/site-config/broken.net");
            then.status(500).body("oops");
        });

        let err = source(&server)
            .fetch_profile("broken.net")
            .await
            .expect_err("500 should fail");
        assert!(err.is_fetch());
    }
}
