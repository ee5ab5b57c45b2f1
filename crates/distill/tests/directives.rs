// ABOUTME: Integration tests for directive shaping through the public engine and client APIs.
// ABOUTME: Covers lazy images, page isolation, repeat shaping, guards, malformed rules and candidate exclusion.

use digests_distill::{
    Client, DirectiveEngine, ExtractionMethod, ExtractionProfile, ProfileTable, SelectorEvaluator,
};
use dom_query::Document;
use pretty_assertions::assert_eq;

const PAGE_URL: &str = "https://mag.example.net/feature";

fn shape(html: &str, profile: &ExtractionProfile) -> String {
    let page = Document::from(html);
    let engine = DirectiveEngine::new(&SelectorEvaluator, PAGE_URL);
    let shaped = engine
        .shape_page(&page, &profile.directives())
        .expect("guard passes");
    shaped.doc.html().to_string()
}

#[test]
fn lazy_images_gain_a_real_source() {
    let profile = ExtractionProfile {
        src_lazy_load_attr: vec!["data-src".into()],
        ..Default::default()
    };
    let out = shape(r#"<div id="content"><img data-src="lazy.jpg"></div>"#, &profile);
    assert!(out.contains(r#"src="lazy.jpg""#));
    assert!(!out.contains("data-src"));
}

#[test]
fn shaping_leaves_the_original_page_alone() {
    let profile = ExtractionProfile {
        strip: vec!["//div[@class='ad']".into()],
        ..Default::default()
    };
    let page = Document::from(r#"<div class="ad">Buy now</div><p>Story</p>"#);
    let engine = DirectiveEngine::new(&SelectorEvaluator, PAGE_URL);
    let shaped = engine.shape_page(&page, &profile.directives()).unwrap();

    assert!(!shaped.doc.html().contains("Buy now"));
    assert!(page.html().contains("Buy now"));
}

#[test]
fn shaping_twice_changes_nothing_more() {
    let profile = ExtractionProfile {
        strip: vec!["//aside".into()],
        strip_id_or_class: vec!["promo".into()],
        strip_attr: vec!["//p/@style".into()],
        dissolve: vec!["//span[@class='wrap']".into()],
        src_lazy_load_attr: vec!["data-src".into()],
        convert_double_br_tags: true,
        ..Default::default()
    };
    let html = r#"<html><body><div id="main">
        <aside>Sidebar</aside><div class="promo-box">Promo</div>
        <p style="color:red"><span class="wrap">Wrapped text</span></p>
        <img data-src="a.jpg"><div>One<br><br>Two</div>
        </div></body></html>"#;

    let once = shape(html, &profile);
    let twice = shape(&once, &profile);
    assert_eq!(once, twice);
    assert!(!once.contains("Sidebar"));
    assert!(!once.contains("Promo"));
    assert!(!once.contains("style="));
    assert!(!once.contains("class=\"wrap\""));
    assert!(once.contains("Wrapped text"));
}

#[test]
fn unmet_guard_aborts_shaping() {
    let profile = ExtractionProfile {
        if_page_contains: vec!["//div[@id='article-marker']".into()],
        ..Default::default()
    };
    let page = Document::from("<div id='other'>x</div>");
    let engine = DirectiveEngine::new(&SelectorEvaluator, PAGE_URL);
    let err = engine
        .shape_page(&page, &profile.directives())
        .err()
        .expect("guard should fail");
    assert!(err.is_guard_failure());

    let page = Document::from("<div id='article-marker'>x</div>");
    assert!(engine.shape_page(&page, &profile.directives()).is_ok());
}

#[test]
fn malformed_rules_are_skipped_not_fatal() {
    let profile = ExtractionProfile {
        strip: vec![
            "//div[text()='gone']".into(),
            "//div[@class='junk']".into(),
        ],
        ..Default::default()
    };
    let out = shape(
        r#"<div class="junk">Junk</div><div>gone</div><p>Kept</p>"#,
        &profile,
    );
    assert!(!out.contains("Junk"));
    assert!(out.contains("gone"));
    assert!(out.contains("Kept"));
}

#[test]
fn native_ad_clue_flags_without_removing() {
    let profile = ExtractionProfile {
        native_ad_clue: vec!["//div[@class='sponsor-label']".into()],
        ..Default::default()
    };
    let page = Document::from(r#"<div class="sponsor-label">Paid post</div><p>Body</p>"#);
    let engine = DirectiveEngine::new(&SelectorEvaluator, PAGE_URL);
    let shaped = engine.shape_page(&page, &profile.directives()).unwrap();
    assert!(shaped.is_native_ad());
    assert_eq!(
        shaped.native_ad_clue.as_deref(),
        Some("//div[@class='sponsor-label']")
    );
    assert!(shaped.doc.html().contains("Paid post"));
}

#[tokio::test]
async fn excluded_candidates_lose_to_clean_ones() {
    let paragraph =
        "Long-form reporting keeps going with enough detail to count as real text. ".repeat(4);
    let profile = ExtractionProfile {
        body: vec![
            "//div[@class='entry teaser']".into(),
            "//div[@class='entry full']".into(),
        ],
        skip_id_or_class: vec!["teaser".into()],
        ..Default::default()
    };
    let html = format!(
        r#"<html><body>
        <div class="entry teaser"><p>Short teaser copy that should never be chosen. {}</p></div>
        <div class="entry full"><p>{}</p></div>
        </body></html>"#,
        paragraph, paragraph
    );
    let mut table = ProfileTable::new();
    table.insert("mag.example.net", profile);
    let result = Client::builder()
        .min_content_length(100)
        .profiles(table)
        .build()
        .extract_html(&html, PAGE_URL)
        .await
        .unwrap();

    assert_eq!(result.extraction_method, ExtractionMethod::SiteConfig);
    assert!(!result.text_content.contains("Short teaser"));
    assert!(result.text_content.contains("Long-form reporting"));
}
