// ABOUTME: Site extraction profile record, its normalized directive list and the hostname-keyed table.
// ABOUTME: Every field defaults so engines consume the tagged Directive list instead of probing optional keys.

//! Site extraction profiles.
//!
//! A profile bundles the location rules and cleaning directives for a single
//! hostname. Profiles arrive from three places (the embedded table, the
//! FiveFilters text format and the remote profile service) and all of them
//! deserialize into the same fully-defaulted [`ExtractionProfile`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A literal find/replace applied to raw page markup before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub find: String,
    #[serde(default)]
    pub replace: String,
}

/// A per-hostname bundle of extraction and cleaning rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionProfile {
    /// Hostname key, without any leading `www.`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(deserialize_with = "string_or_list")]
    pub title: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub body: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub author: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub date: Vec<String>,

    #[serde(deserialize_with = "string_or_list")]
    pub strip: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub strip_id_or_class: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub strip_image_src: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub strip_attr: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub post_strip_attr: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub dissolve: Vec<String>,

    /// Body candidates whose class or id contains one of these are rejected.
    #[serde(deserialize_with = "string_or_list")]
    pub skip_id_or_class: Vec<String>,
    /// Every rule must match for the site-config strategy to run.
    #[serde(deserialize_with = "string_or_list")]
    pub if_page_contains: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub native_ad_clue: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub src_lazy_load_attr: Vec<String>,

    #[serde(deserialize_with = "lenient_bool")]
    pub strip_comments: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub convert_double_br_tags: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub skip_json_ld: bool,
    #[serde(alias = "preferJsonLd", alias = "prefer_jsonld", deserialize_with = "lenient_bool")]
    pub prefer_json_ld: bool,
    #[serde(deserialize_with = "lenient_bool_default_true")]
    pub insert_detected_image: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub autodetect_on_failure: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub autodetect_next_page: bool,

    #[serde(deserialize_with = "string_or_list")]
    pub single_page_link: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub next_page_link: Vec<String>,

    #[serde(deserialize_with = "string_or_list")]
    pub find_string: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub replace_string: Vec<String>,
    #[serde(alias = "htmlPreprocessing", skip_serializing_if = "Vec::is_empty")]
    pub html_preprocessing: Vec<Replacement>,

    #[serde(deserialize_with = "lenient_bool")]
    pub tidy: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub prune: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub test_url: Vec<String>,
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self {
            host: String::new(),
            title: Vec::new(),
            body: Vec::new(),
            author: Vec::new(),
            date: Vec::new(),
            strip: Vec::new(),
            strip_id_or_class: Vec::new(),
            strip_image_src: Vec::new(),
            strip_attr: Vec::new(),
            post_strip_attr: Vec::new(),
            dissolve: Vec::new(),
            skip_id_or_class: Vec::new(),
            if_page_contains: Vec::new(),
            native_ad_clue: Vec::new(),
            src_lazy_load_attr: Vec::new(),
            strip_comments: false,
            convert_double_br_tags: false,
            skip_json_ld: false,
            prefer_json_ld: false,
            insert_detected_image: true,
            autodetect_on_failure: false,
            autodetect_next_page: false,
            single_page_link: Vec::new(),
            next_page_link: Vec::new(),
            find_string: Vec::new(),
            replace_string: Vec::new(),
            html_preprocessing: Vec::new(),
            tidy: false,
            prune: false,
            test_url: Vec::new(),
        }
    }
}

/// One cleaning or transform operation, in engine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `if_page_contains`: every marker rule must match.
    Guard(Vec<String>),
    Strip(Vec<String>),
    StripIdOrClass(Vec<String>),
    StripImageSrc(Vec<String>),
    StripAttr(Vec<String>),
    Dissolve(Vec<String>),
    StripComments,
    PromoteLazyImages(Vec<String>),
    DoubleBrToParagraphs,
    NativeAdClue(Vec<String>),
    InsertDetectedImage,
    PostStripAttr(Vec<String>),
}

impl Directive {
    /// Directives that act on the chosen body rather than the page clone.
    pub fn is_body_stage(&self) -> bool {
        matches!(
            self,
            Directive::InsertDetectedImage | Directive::PostStripAttr(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::Guard(_) => "if_page_contains",
            Directive::Strip(_) => "strip",
            Directive::StripIdOrClass(_) => "strip_id_or_class",
            Directive::StripImageSrc(_) => "strip_image_src",
            Directive::StripAttr(_) => "strip_attr",
            Directive::Dissolve(_) => "dissolve",
            Directive::StripComments => "strip_comments",
            Directive::PromoteLazyImages(_) => "src_lazy_load_attr",
            Directive::DoubleBrToParagraphs => "convert_double_br_tags",
            Directive::NativeAdClue(_) => "native_ad_clue",
            Directive::InsertDetectedImage => "insert_detected_image",
            Directive::PostStripAttr(_) => "post_strip_attr",
        }
    }
}

fn non_empty(list: &[String]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = list
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

impl ExtractionProfile {
    /// Builds the ordered directive list for this profile.
    pub fn directives(&self) -> Vec<Directive> {
        let mut out = Vec::new();
        if let Some(rules) = non_empty(&self.if_page_contains) {
            out.push(Directive::Guard(rules));
        }
        if let Some(rules) = non_empty(&self.strip) {
            out.push(Directive::Strip(rules));
        }
        if let Some(rules) = non_empty(&self.strip_id_or_class) {
            out.push(Directive::StripIdOrClass(rules));
        }
        if let Some(rules) = non_empty(&self.strip_image_src) {
            out.push(Directive::StripImageSrc(rules));
        }
        if let Some(rules) = non_empty(&self.strip_attr) {
            out.push(Directive::StripAttr(rules));
        }
        if let Some(rules) = non_empty(&self.dissolve) {
            out.push(Directive::Dissolve(rules));
        }
        if self.strip_comments {
            out.push(Directive::StripComments);
        }
        if let Some(attrs) = non_empty(&self.src_lazy_load_attr) {
            out.push(Directive::PromoteLazyImages(attrs));
        }
        if self.convert_double_br_tags {
            out.push(Directive::DoubleBrToParagraphs);
        }
        if let Some(rules) = non_empty(&self.native_ad_clue) {
            out.push(Directive::NativeAdClue(rules));
        }
        if self.insert_detected_image {
            out.push(Directive::InsertDetectedImage);
        }
        if let Some(rules) = non_empty(&self.post_strip_attr) {
            out.push(Directive::PostStripAttr(rules));
        }
        out
    }

    /// Raw-markup rewrites in application order.
    ///
    /// Explicit preprocessing pairs come first, then `find_string` /
    /// `replace_string` pairs. An opening-tag rename such as `<section` to
    /// `<div` also renames the closing tag unless that rewrite is declared.
    pub fn replacements(&self) -> Vec<Replacement> {
        let mut out: Vec<Replacement> = self.html_preprocessing.clone();
        for (find, replace) in self.find_string.iter().zip(self.replace_string.iter()) {
            out.push(Replacement {
                find: find.clone(),
                replace: replace.clone(),
            });
        }
        let declared: Vec<String> = out.iter().map(|r| r.find.clone()).collect();
        let mut closing = Vec::new();
        for r in &out {
            if let (Some(from), Some(to)) = (opening_tag_name(&r.find), opening_tag_name(&r.replace))
            {
                let find = format!("</{}>", from);
                if !declared.contains(&find) {
                    closing.push(Replacement {
                        find,
                        replace: format!("</{}>", to),
                    });
                }
            }
        }
        out.extend(closing);
        out.retain(|r| !r.find.is_empty());
        out
    }

    /// Applies [`Self::replacements`] to raw markup.
    pub fn preprocess(&self, html: &str) -> String {
        let mut out = html.to_string();
        for r in self.replacements() {
            out = out.replace(&r.find, &r.replace);
        }
        out
    }

    /// Every location rule the profile evaluates.
    pub fn all_rules(&self) -> impl Iterator<Item = &String> {
        self.title
            .iter()
            .chain(&self.body)
            .chain(&self.author)
            .chain(&self.date)
            .chain(&self.strip)
            .chain(&self.strip_attr)
            .chain(&self.post_strip_attr)
            .chain(&self.dissolve)
            .chain(&self.if_page_contains)
            .chain(&self.native_ad_clue)
            .chain(&self.single_page_link)
            .chain(&self.next_page_link)
    }
}

fn opening_tag_name(s: &str) -> Option<&str> {
    let name = s.strip_prefix('<')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Some(name)
    } else {
        None
    }
}

/// Accepts a single string, a list of strings or null.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseBool {
    Bool(bool),
    Text(String),
    Number(i64),
}

impl LooseBool {
    fn truthy(&self) -> bool {
        match self {
            LooseBool::Bool(b) => *b,
            LooseBool::Text(s) => matches!(s.trim(), "yes" | "true" | "1"),
            LooseBool::Number(n) => *n != 0,
        }
    }
}

/// Accepts booleans, `"yes"`/`"true"`/`"1"` strings, numbers and null (false).
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<LooseBool>::deserialize(deserializer)?
        .map(|b| b.truthy())
        .unwrap_or(false))
}

/// Same as [`lenient_bool`] but null means true.
fn lenient_bool_default_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<LooseBool>::deserialize(deserializer)?
        .map(|b| b.truthy())
        .unwrap_or(true))
}

/// Hostname-keyed table of profiles.
#[derive(Debug, Default, Clone)]
pub struct ProfileTable {
    map: HashMap<String, ExtractionProfile>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile under its normalized host.
    pub fn insert(&mut self, host: &str, mut profile: ExtractionProfile) {
        let key = normalize_host(host);
        profile.host = key.clone();
        self.map.insert(key, profile);
    }

    /// Exact-match lookup after normalization.
    pub fn get(&self, host: &str) -> Option<&ExtractionProfile> {
        self.map.get(&normalize_host(host))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtractionProfile)> {
        self.map.iter()
    }
}

/// Lowercases a hostname and strips a single leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let lower = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_fully_populated() {
        let profile: ExtractionProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile, ExtractionProfile::default());
        assert!(profile.insert_detected_image);
        assert!(!profile.autodetect_next_page);
    }

    #[test]
    fn lenient_field_shapes() {
        let profile: ExtractionProfile = serde_json::from_str(
            r#"{
                "body": "//article",
                "src_lazy_load_attr": ["data-src"],
                "tidy": null,
                "strip_comments": "yes",
                "insert_detected_image": false,
                "preferJsonLd": true
            }"#,
        )
        .unwrap();
        assert_eq!(profile.body, vec!["//article"]);
        assert_eq!(profile.src_lazy_load_attr, vec!["data-src"]);
        assert!(!profile.tidy);
        assert!(profile.strip_comments);
        assert!(!profile.insert_detected_image);
        assert!(profile.prefer_json_ld);
    }

    #[test]
    fn directives_follow_engine_order() {
        let profile = ExtractionProfile {
            post_strip_attr: vec!["//*/@class".into()],
            native_ad_clue: vec!["//meta[@name='sponsored']".into()],
            convert_double_br_tags: true,
            src_lazy_load_attr: vec!["data-src".into()],
            strip_comments: true,
            dissolve: vec!["//div[@class='wrap']".into()],
            strip_attr: vec!["//img/@data-src".into()],
            strip: vec!["//nav".into(), "  ".into()],
            if_page_contains: vec!["//article".into()],
            ..Default::default()
        };
        let names: Vec<&str> = profile.directives().iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec![
                "if_page_contains",
                "strip",
                "strip_attr",
                "dissolve",
                "strip_comments",
                "src_lazy_load_attr",
                "convert_double_br_tags",
                "native_ad_clue",
                "insert_detected_image",
                "post_strip_attr",
            ]
        );
        assert_eq!(profile.directives()[1], Directive::Strip(vec!["//nav".into()]));
    }

    #[test]
    fn replacements_add_closing_tag_renames() {
        let profile = ExtractionProfile {
            find_string: vec!["<section".into(), "&nbsp;".into()],
            replace_string: vec!["<div".into(), " ".into()],
            ..Default::default()
        };
        let out = profile.preprocess("<section class=\"a\">x&nbsp;y</section>");
        assert_eq!(out, "<div class=\"a\">x y</div>");
    }

    #[test]
    fn table_lookup_is_exact_after_www_strip() {
        let mut table = ProfileTable::new();
        table.insert("www.Example.com", ExtractionProfile::default());
        assert_eq!(table.len(), 1);
        assert!(table.get("example.com").is_some());
        assert!(table.get("www.example.com").is_some());
        assert!(table.get("blog.example.com").is_none());
        assert_eq!(table.get("example.com").unwrap().host, "example.com");
    }
}
