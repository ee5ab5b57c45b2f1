// ABOUTME: Integration tests for multi-page articles: next-page rules, autodetect, merging and stop conditions.
// ABOUTME: Pages are served from an in-memory fetcher so every fetch can be counted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use digests_distill::{
    Client, Crawler, ExtractError, ExtractionMethod, ExtractionProfile, FetchedPage, PageFetcher,
    PageLinks, ProfileTable, SelectorEvaluator, StopReason,
};
use pretty_assertions::assert_eq;
use url::Url;

const STORY: &str = "https://news.example.com/story";

fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
}

/// Serves canned pages and records every requested URL.
#[derive(Default)]
struct MapFetcher {
    pages: HashMap<String, String>,
    hits: Mutex<Vec<String>>,
}

impl MapFetcher {
    fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        self.hits.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(html) => Ok(FetchedPage {
                url: url.to_string(),
                final_url: url.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                html: html.clone(),
                fetched_at: fetched_at(),
            }),
            None => Err(ExtractError::fetch(url, "FetchPage", None)),
        }
    }
}

fn paged_profile() -> ExtractionProfile {
    ExtractionProfile {
        body: vec!["//div[@class='story']".into()],
        next_page_link: vec!["//a[@rel='next']/@href".into()],
        ..Default::default()
    }
}

fn client(fetcher: Arc<MapFetcher>, profile: ExtractionProfile) -> digests_distill::ClientBuilder {
    let mut table = ProfileTable::new();
    table.insert("news.example.com", profile);
    Client::builder()
        .min_content_length(40)
        .profiles(table)
        .fetcher(fetcher)
}

fn story_page(unique: &str, next: Option<&str>) -> String {
    let link = next
        .map(|href| format!(r#"<a rel="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>Story</title></head><body>
        <div class="story"><p>Pagination Fixture</p><p>{}</p></div>
        <div class="pager">{}</div>
        </body></html>"#,
        unique, link
    )
}

#[tokio::test]
async fn shared_boilerplate_appears_once_after_merging() {
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(
                STORY,
                story_page(
                    "The first page explains how the bridge was designed.",
                    Some("/story?page=2"),
                ),
            )
            .page(
                "https://news.example.com/story?page=2",
                story_page("The second page covers how the bridge was built.", None),
            ),
    );
    let result = client(fetcher.clone(), paged_profile())
        .build()
        .extract(STORY)
        .await
        .expect("paginated extraction");

    assert_eq!(result.extraction_method, ExtractionMethod::SiteConfig);
    assert_eq!(result.page_count, 2);
    assert!(result.text_content.contains("how the bridge was designed"));
    assert!(result.text_content.contains("how the bridge was built"));
    assert_eq!(result.text_content.matches("Pagination Fixture").count(), 1);
    assert!(result.content.contains("data-page-break"));
    assert_eq!(result.length, result.text_content.chars().count());
    assert_eq!(result.provenance.retrieved_at, fetched_at());
    assert_eq!(
        fetcher.hits(),
        vec![STORY.to_string(), "https://news.example.com/story?page=2".to_string()]
    );
}

#[tokio::test]
async fn shared_text_without_paragraph_wrappers_appears_once() {
    let page = |n: u32, unique: &str, next: &str| {
        format!(
            r#"<html><body><div class="story">Pagination Fixture.<br>Page {} unique phrase {}.</div>{}</body></html>"#,
            n, unique, next
        )
    };
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(STORY, page(1, "alpha", r#"<a rel="next" href="/story?page=2">Next</a>"#))
            .page("https://news.example.com/story?page=2", page(2, "beta", "")),
    );
    let result = client(fetcher, paged_profile())
        .build()
        .extract(STORY)
        .await
        .expect("paginated extraction");

    assert_eq!(result.page_count, 2);
    assert_eq!(result.text_content.matches("Pagination Fixture").count(), 1);
    assert!(result.text_content.contains("Page 1 unique phrase alpha."));
    assert!(result.text_content.contains("Page 2 unique phrase beta."));
}

#[tokio::test]
async fn failed_continuation_keeps_the_pages_already_merged() {
    let fetcher = Arc::new(MapFetcher::default().page(
        STORY,
        story_page(
            "Only the opening page of this article could be retrieved today.",
            Some("/story?page=2"),
        ),
    ));
    let result = client(fetcher.clone(), paged_profile())
        .build()
        .extract(STORY)
        .await
        .expect("first page still counts");

    assert_eq!(result.page_count, 1);
    assert!(result.text_content.contains("opening page"));
    assert_eq!(fetcher.hits().len(), 2);
}

#[tokio::test]
async fn max_pages_bounds_the_crawl() {
    let mut fetcher = MapFetcher::default();
    for n in 1..=4 {
        let url = if n == 1 {
            STORY.to_string()
        } else {
            format!("{}?page={}", STORY, n)
        };
        let next = format!("/story?page={}", n + 1);
        fetcher = fetcher.page(
            &url,
            story_page(
                &format!("Chapter number {} of the serial continues right here.", n),
                Some(&next),
            ),
        );
    }
    let fetcher = Arc::new(fetcher);
    let result = client(fetcher.clone(), paged_profile())
        .max_pages(2)
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.page_count, 2);
    assert_eq!(fetcher.hits().len(), 2);
    assert!(result.text_content.contains("Chapter number 2"));
    assert!(!result.text_content.contains("Chapter number 3"));
}

#[tokio::test]
async fn links_back_to_a_visited_page_end_the_crawl() {
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(
                STORY,
                story_page(
                    "Opening text for the looping article lives here.",
                    Some("/story?page=2"),
                ),
            )
            .page(
                "https://news.example.com/story?page=2",
                story_page("Closing text for the looping article lives here.", Some("/story#top")),
            ),
    );
    let result = client(fetcher.clone(), paged_profile())
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.page_count, 2);
    assert_eq!(fetcher.hits().len(), 2);
}

#[tokio::test]
async fn pagination_can_be_disabled() {
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(
                STORY,
                story_page(
                    "A standalone page that would otherwise continue elsewhere.",
                    Some("/story?page=2"),
                ),
            )
            .page(
                "https://news.example.com/story?page=2",
                story_page("Never fetched because pagination is off.", None),
            ),
    );
    let result = client(fetcher.clone(), paged_profile())
        .follow_pagination(false)
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.page_count, 1);
    assert_eq!(fetcher.hits(), vec![STORY.to_string()]);
}

#[tokio::test]
async fn structured_data_results_are_not_paginated() {
    let profile = ExtractionProfile {
        body: vec!["//div[@class='missing']".into()],
        next_page_link: vec!["//a[@rel='next']/@href".into()],
        ..Default::default()
    };
    let html = r#"<html><head><script type="application/ld+json">
        {"@type":"Article","headline":"LD","articleBody":"The full article text already lives in the structured block.\nIt has a second paragraph too."}
        </script></head><body><p>Teaser</p><a rel="next" href="/story?page=2">Next</a></body></html>"#;
    let fetcher = Arc::new(MapFetcher::default().page(STORY, html));
    let result = client(fetcher.clone(), profile)
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.extraction_method, ExtractionMethod::StructuredData);
    assert_eq!(result.page_count, 1);
    assert_eq!(fetcher.hits(), vec![STORY.to_string()]);
}

#[tokio::test]
async fn single_page_view_replaces_the_paged_body() {
    let profile = ExtractionProfile {
        body: vec!["//div[@class='story']".into()],
        single_page_link: vec!["//a[@class='print']/@href".into()],
        next_page_link: vec!["//a[@rel='next']/@href".into()],
        ..Default::default()
    };
    let first = r#"<html><body>
        <div class="story"><p>Part one of a long read that is split across pages.</p></div>
        <a class="print" href="/story/print">Print</a><a rel="next" href="/story?page=2">Next</a>
        </body></html>"#;
    let print = r#"<html><body>
        <div class="story"><p>Part one of a long read that is split across pages.</p><p>Part two arrives in the same view.</p></div>
        </body></html>"#;
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(STORY, first)
            .page("https://news.example.com/story/print", print),
    );
    let result = client(fetcher.clone(), profile)
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.page_count, 1);
    assert!(result.text_content.contains("Part two arrives"));
    assert_eq!(
        fetcher.hits(),
        vec![STORY.to_string(), "https://news.example.com/story/print".to_string()]
    );
}

#[tokio::test]
async fn autodetect_follows_rel_next_on_generic_pages() {
    let profile = ExtractionProfile {
        autodetect_next_page: true,
        ..Default::default()
    };
    let page = |text: &str, next: &str| {
        format!(
            r#"<html><head>{}</head><body><article><p>{}</p><p>{}</p></article></body></html>"#,
            next,
            text,
            "Every page of this series repeats nothing but its own words."
        )
    };
    let fetcher = Arc::new(
        MapFetcher::default()
            .page(
                STORY,
                page(
                    "Generic scoring picks this paragraph on the first page.",
                    r#"<link rel="next" href="/story/2">"#,
                ),
            )
            .page(
                "https://news.example.com/story/2",
                page("Generic scoring picks this paragraph on the second page.", ""),
            ),
    );
    let result = client(fetcher.clone(), profile)
        .build()
        .extract(STORY)
        .await
        .unwrap();

    assert_eq!(result.extraction_method, ExtractionMethod::DomFallback);
    assert_eq!(result.page_count, 2);
    assert!(result.text_content.contains("on the second page"));
    assert_eq!(
        result
            .text_content
            .matches("repeats nothing but its own words")
            .count(),
        1
    );
}

#[tokio::test]
async fn crawler_reports_why_it_stopped() {
    let profile = paged_profile();
    let fetcher = MapFetcher::default()
        .page(
            "https://news.example.com/story?page=2",
            story_page("Second page words for the crawler test.", Some("/story")),
        );
    let first_url = Url::parse(STORY).unwrap();
    let links = PageLinks {
        single_page: None,
        next: Some(Url::parse("https://news.example.com/story?page=2").unwrap()),
    };

    let outcome = Crawler::new(&fetcher, &SelectorEvaluator, &profile, ExtractionMethod::SiteConfig)
        .crawl(
            &first_url,
            "<p>First page words for the crawler test.</p>".to_string(),
            links.clone(),
        )
        .await;
    assert_eq!(outcome.stop, StopReason::Revisited);
    assert_eq!(outcome.page_count, 2);
    assert_eq!(
        outcome.visited,
        vec![STORY.to_string(), "https://news.example.com/story?page=2".to_string()]
    );

    let empty = MapFetcher::default();
    let outcome = Crawler::new(&empty, &SelectorEvaluator, &profile, ExtractionMethod::SiteConfig)
        .crawl(&first_url, "<p>Only page.</p>".to_string(), links)
        .await;
    assert_eq!(outcome.stop, StopReason::FetchFailed);
    assert_eq!(outcome.page_count, 1);
}
