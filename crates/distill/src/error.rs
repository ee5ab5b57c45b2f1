// ABOUTME: Error types for the extraction engine: ErrorCode categories and the ExtractError struct.
// ABOUTME: Codes mirror the recovery taxonomy; only total failure and first-page fetch errors reach callers.

use std::fmt;

/// Error codes representing the categories of extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Timeout,
    Ssrf,
    /// No profile for the hostname. Recovered locally by the fallback strategies.
    ConfigLookupMiss,
    /// A site-config guard marker did not match.
    GuardFailure,
    /// A malformed location rule.
    RuleEvaluation,
    /// A candidate body fell below the minimum length.
    InsufficientContent,
    /// A page after the first could not be fetched or parsed.
    PageFetchFailure,
    /// No strategy produced any content.
    TotalExtractionFailure,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Ssrf => "SSRF blocked",
            ErrorCode::ConfigLookupMiss => "no site profile",
            ErrorCode::GuardFailure => "guard not satisfied",
            ErrorCode::RuleEvaluation => "rule evaluation error",
            ErrorCode::InsufficientContent => "insufficient content",
            ErrorCode::PageFetchFailure => "page fetch failure",
            ErrorCode::TotalExtractionFailure => "no article content found",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for extraction operations.
#[derive(Debug, thiserror::Error)]
pub struct ExtractError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "distill: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ExtractError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Fetch error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create an SSRF error.
    pub fn ssrf(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Ssrf, url, op, source)
    }

    pub fn config_lookup_miss(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::ConfigLookupMiss, url, op, None)
    }

    pub fn guard_failure(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::GuardFailure, url, op, None)
    }

    /// Create a RuleEvaluation error wrapping the offending rule's error.
    pub fn rule_evaluation(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::RuleEvaluation, url, op, source)
    }

    pub fn insufficient_content(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::InsufficientContent, url, op, None)
    }

    /// Create a PageFetchFailure error for a page after the first.
    pub fn page_fetch_failure(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::PageFetchFailure, url, op, source)
    }

    /// Create a TotalExtractionFailure error.
    pub fn total_failure(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::TotalExtractionFailure, url, op, None)
    }

    /// Returns true if this is a Timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Returns true if this is an SSRF error.
    pub fn is_ssrf(&self) -> bool {
        self.code == ErrorCode::Ssrf
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    pub fn is_guard_failure(&self) -> bool {
        self.code == ErrorCode::GuardFailure
    }

    pub fn is_rule_evaluation(&self) -> bool {
        self.code == ErrorCode::RuleEvaluation
    }

    pub fn is_insufficient_content(&self) -> bool {
        self.code == ErrorCode::InsufficientContent
    }

    pub fn is_page_fetch_failure(&self) -> bool {
        self.code == ErrorCode::PageFetchFailure
    }

    /// Returns true if no strategy produced content.
    pub fn is_total_failure(&self) -> bool {
        self.code == ErrorCode::TotalExtractionFailure
    }

    /// Returns true for codes the engine recovers from without surfacing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigLookupMiss
                | ErrorCode::GuardFailure
                | ErrorCode::RuleEvaluation
                | ErrorCode::InsufficientContent
                | ErrorCode::PageFetchFailure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_op_url_and_source() {
        let err = ExtractError::fetch(
            "https://example.com/a",
            "Fetch",
            Some(anyhow::anyhow!("HTTP status 500")),
        );
        assert_eq!(
            err.to_string(),
            "distill: Fetch https://example.com/a: fetch error: HTTP status 500"
        );
        assert!(err.is_fetch());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn recovery_taxonomy() {
        assert!(ExtractError::guard_failure("u", "SiteConfig").is_recoverable());
        assert!(ExtractError::insufficient_content("u", "SiteConfig").is_recoverable());
        assert!(ExtractError::page_fetch_failure("u", "Paginate", None).is_recoverable());
        assert!(ExtractError::config_lookup_miss("u", "Resolve").is_recoverable());
        let total = ExtractError::total_failure("u", "Extract");
        assert!(total.is_total_failure());
        assert!(!total.is_recoverable());
    }
}
