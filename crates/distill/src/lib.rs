// ABOUTME: Main library entry point for the distill article extraction engine.
// ABOUTME: Re-exports the public API: Client, ClientBuilder, ExtractionResult, ExtractError, profiles and seams.

//! Distill - finds the article inside a web page and hands back a clean record.
//!
//! A run resolves the page's host to an optional site profile, shapes a
//! private copy of the page with the profile's directives, then tries the
//! site-config rules, embedded structured data, and a generic scoring
//! heuristic in turn. Multi-page articles are followed and merged.
//!
//! # Example
//!
//! ```no_run
//! use digests_distill::{Client, ExtractError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ExtractError> {
//!     let client = Client::builder().build();
//!     let result = client.extract("https://example.com/article").await?;
//!     println!("{}", result.format_markdown());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod directives;
pub mod dom;
pub mod error;
pub mod extractors;
pub mod formats;
pub mod options;
pub mod pagination;
pub mod paragraphs;
pub mod profiles;
pub mod query;
pub mod resource;
pub mod result;

pub use crate::client::Client;
pub use crate::directives::{DirectiveEngine, ShapedPage};
pub use crate::error::{ErrorCode, ExtractError};
pub use crate::options::{ClientBuilder, ContentType, Options};
pub use crate::pagination::{Crawler, PageLinks, StopReason};
pub use crate::profiles::{
    load_builtin_profiles, load_ftr_dir, ConfigResolver, Directive, ExtractionProfile,
    HttpProfileSource, ProfileSource, ProfileTable,
};
pub use crate::query::{Match, QueryEvaluator, RuleError, SelectorEvaluator};
pub use crate::resource::{FetchedPage, HttpFetcher, PageFetcher};
pub use crate::result::{ExtractionMethod, ExtractionResult, Provenance};
