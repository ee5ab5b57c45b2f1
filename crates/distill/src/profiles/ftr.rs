// ABOUTME: Parser for the FiveFilters full-text-rss site-config text format.
// ABOUTME: Reads `command: value` lines into an ExtractionProfile; profiles without body rules are rejected.

use once_cell::sync::Lazy;
use regex::Regex;

use super::profile::ExtractionProfile;

static PARAM_COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z0-9_]+)\((.*?)\)$").expect("valid command regex"));

fn truthy(val: &str) -> bool {
    matches!(val, "yes" | "true" | "1")
}

/// Parses a site-config text file.
///
/// Lines look like `command: value`, split on the first colon so XPath values
/// such as `//meta[@property='article:author']` survive intact. Blank lines
/// and `#` comments are skipped. Returns `None` when no `body` rule is
/// declared, since a profile without body rules cannot drive extraction.
pub fn parse_profile(text: &str) -> Option<ExtractionProfile> {
    let mut p = ExtractionProfile::default();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((command, val)) = trimmed.split_once(':') else {
            continue;
        };
        let command = command.trim();
        let val = val.trim();
        if command.is_empty() || val.is_empty() {
            continue;
        }
        let list = match command {
            "title" => Some(&mut p.title),
            "body" => Some(&mut p.body),
            "author" => Some(&mut p.author),
            "date" => Some(&mut p.date),
            "strip" => Some(&mut p.strip),
            "strip_id_or_class" => Some(&mut p.strip_id_or_class),
            "strip_image_src" => Some(&mut p.strip_image_src),
            "strip_attr" => Some(&mut p.strip_attr),
            "post_strip_attr" => Some(&mut p.post_strip_attr),
            "dissolve" => Some(&mut p.dissolve),
            "skip_id_or_class" => Some(&mut p.skip_id_or_class),
            "if_page_contains" => Some(&mut p.if_page_contains),
            "native_ad_clue" => Some(&mut p.native_ad_clue),
            "src_lazy_load_attr" => Some(&mut p.src_lazy_load_attr),
            "single_page_link" => Some(&mut p.single_page_link),
            "next_page_link" => Some(&mut p.next_page_link),
            "test_url" => Some(&mut p.test_url),
            "find_string" => Some(&mut p.find_string),
            "replace_string" => Some(&mut p.replace_string),
            _ => None,
        };
        if let Some(list) = list {
            list.push(val.to_string());
            continue;
        }
        let flag = match command {
            "tidy" => Some(&mut p.tidy),
            "prune" => Some(&mut p.prune),
            "autodetect_on_failure" => Some(&mut p.autodetect_on_failure),
            "autodetect_next_page" => Some(&mut p.autodetect_next_page),
            "strip_comments" => Some(&mut p.strip_comments),
            "convert_double_br_tags" => Some(&mut p.convert_double_br_tags),
            "skip_json_ld" => Some(&mut p.skip_json_ld),
            "prefer_jsonld" | "prefer_json_ld" => Some(&mut p.prefer_json_ld),
            "insert_detected_image" => Some(&mut p.insert_detected_image),
            _ => None,
        };
        if let Some(flag) = flag {
            *flag = truthy(val);
            continue;
        }
        if let Some(caps) = PARAM_COMMAND_RE.captures(command) {
            if &caps[1] == "replace_string" {
                p.find_string.push(caps[2].to_string());
                p.replace_string.push(val.to_string());
            }
        }
    }
    if p.body.is_empty() {
        None
    } else {
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
# Example site config
title: //h1[@class='headline']
body: //div[@id='article-body']
body: //article
author: //meta[@property='article:author']/@content
strip: //div[contains(@class, 'share')]
strip_id_or_class: newsletter
src_lazy_load_attr: data-src
strip_comments: yes
convert_double_br_tags: true
skip_json_ld: no
replace_string(<section): <div
next_page_link: //a[@rel='next']
test_url: https://example.com/story
unknown_directive: ignored
"#;

    #[test]
    fn parses_commands() {
        let p = parse_profile(SAMPLE).expect("has body rules");
        assert_eq!(p.title, vec!["//h1[@class='headline']"]);
        assert_eq!(p.body, vec!["//div[@id='article-body']", "//article"]);
        assert_eq!(p.author, vec!["//meta[@property='article:author']/@content"]);
        assert_eq!(p.strip_id_or_class, vec!["newsletter"]);
        assert_eq!(p.src_lazy_load_attr, vec!["data-src"]);
        assert!(p.strip_comments);
        assert!(p.convert_double_br_tags);
        assert!(!p.skip_json_ld);
        assert_eq!(p.find_string, vec!["<section"]);
        assert_eq!(p.replace_string, vec!["<div"]);
        assert_eq!(p.next_page_link, vec!["//a[@rel='next']"]);
        assert!(p.insert_detected_image);
    }

    #[test]
    fn requires_body_rules() {
        assert!(parse_profile("title: //h1\nstrip: //nav\n").is_none());
        assert!(parse_profile("").is_none());
    }

    #[test]
    fn skips_lines_without_values() {
        let p = parse_profile("body:\nbody: //main\nnonsense line\n").unwrap();
        assert_eq!(p.body, vec!["//main"]);
    }
}
