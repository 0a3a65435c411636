//! Content parser for fetched pages
//!
//! This module turns a raw response body into [`ParseData`]:
//! - HTML gets a title, flattened text, and extracted outgoing links
//! - Plain text is carried through as-is with no links
//! - Binary content is either passed through empty or rejected, depending
//!   on configuration
//!
//! Link extraction covers `<a>`, `<area>`, `<link rel="canonical">`, and
//! `<iframe>`. Every href is canonicalized against the page URL (honoring a
//! `<base href>` override); non-HTTP schemes, fragment-only links, and
//! download links are dropped. `rel="nofollow"` links are followed.

use crate::url::canonicalize;
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Ways parsing a page can fail.
#[derive(Debug, Error)]
pub enum PageParseError {
    #[error("content type {0} is not crawled")]
    DisallowedContentType(String),

    #[error("could not parse content: {0}")]
    ParseFailure(String),
}

/// One outgoing link extracted from a page.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    /// Canonical absolute URL
    pub url: String,

    /// Anchor text, for links that carry any
    pub anchor: Option<String>,

    /// Tag the link was extracted from ("a", "area", "link", "iframe")
    pub tag: String,
}

/// Parsed content of one page.
#[derive(Debug, Clone, Default)]
pub struct ParseData {
    /// Page title (from the <title> tag)
    pub title: Option<String>,

    /// Whitespace-flattened document text
    pub text: String,

    /// Outgoing links, deduplicated, capped at the configured maximum
    pub links: Vec<ExtractedLink>,
}

/// Parses a response body according to its content type.
pub fn parse_content(
    body: &[u8],
    content_type: Option<&str>,
    base: &Url,
    max_links: usize,
    include_binary: bool,
) -> Result<ParseData, PageParseError> {
    let content_type = content_type.unwrap_or("").to_lowercase();

    if has_binary_content(&content_type) {
        if include_binary {
            return Ok(ParseData::default());
        }
        return Err(PageParseError::DisallowedContentType(content_type));
    }

    let text = String::from_utf8_lossy(body);

    if has_plain_text_content(&content_type) {
        return Ok(ParseData {
            title: None,
            text: text.into_owned(),
            links: Vec::new(),
        });
    }

    parse_html(&text, base, max_links)
}

fn has_binary_content(content_type: &str) -> bool {
    content_type.contains("image")
        || content_type.contains("audio")
        || content_type.contains("video")
        || (content_type.contains("application") && !content_type.contains("xhtml"))
}

fn has_plain_text_content(content_type: &str) -> bool {
    content_type.contains("text") && !content_type.contains("html")
}

/// Parses HTML and extracts title, text, and links.
pub fn parse_html(html: &str, base: &Url, max_links: usize) -> Result<ParseData, PageParseError> {
    let document = Html::parse_document(html);
    let base = effective_base(&document, base);

    Ok(ParseData {
        title: extract_title(&document),
        text: extract_text(&document),
        links: extract_links(&document, &base, max_links)?,
    })
}

/// Resolves a `<base href>` override, falling back to the page URL.
fn effective_base(document: &Html, page_url: &Url) -> Url {
    let selector = match Selector::parse("base[href]") {
        Ok(selector) => selector,
        Err(_) => return page_url.clone(),
    };

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

fn extract_text(document: &Html) -> String {
    let fragments: Vec<&str> = document.root_element().text().collect();
    fragments
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_links(
    document: &Html,
    base: &Url,
    max_links: usize,
) -> Result<Vec<ExtractedLink>, PageParseError> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let anchors = selector("a[href], area[href], link[rel='canonical'][href]")?;
    for element in document.select(&anchors) {
        if links.len() >= max_links {
            return Ok(links);
        }
        // Skip download links
        if element.value().attr("download").is_some() {
            continue;
        }
        if let Some(href) = element.value().attr("href") {
            if href.trim_start().starts_with('#') {
                continue;
            }
            if let Some(resolved) = canonicalize(href, Some(base)) {
                if seen.insert(resolved.clone()) {
                    let tag = element.value().name().to_string();
                    let anchor = match tag.as_str() {
                        "a" | "area" => {
                            let text = element.text().collect::<String>().trim().to_string();
                            if text.is_empty() {
                                None
                            } else {
                                Some(text)
                            }
                        }
                        _ => None,
                    };
                    links.push(ExtractedLink {
                        url: resolved,
                        anchor,
                        tag,
                    });
                }
            }
        }
    }

    let frames = selector("iframe[src]")?;
    for element in document.select(&frames) {
        if links.len() >= max_links {
            return Ok(links);
        }
        if let Some(src) = element.value().attr("src") {
            if let Some(resolved) = canonicalize(src, Some(base)) {
                if seen.insert(resolved.clone()) {
                    links.push(ExtractedLink {
                        url: resolved,
                        anchor: None,
                        tag: "iframe".to_string(),
                    });
                }
            }
        }
    }

    Ok(links)
}

fn selector(rule: &str) -> Result<Selector, PageParseError> {
    Selector::parse(rule).map_err(|e| PageParseError::ParseFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn parse(html: &str) -> ParseData {
        parse_html(html, &base_url(), 5000).unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        assert_eq!(parse(html).title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        assert_eq!(parse(html).title, None);
    }

    #[test]
    fn test_extract_text_is_flattened() {
        let html = "<html><body><p>one\n  two</p><p>three</p></body></html>";
        assert_eq!(parse(html).text, "one two three");
    }

    #[test]
    fn test_extract_relative_link() {
        let html = r#"<html><body><a href="/other">Link</a></body></html>"#;
        let parsed = parse(html);
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].url, "https://example.com/other");
        assert_eq!(parsed.links[0].anchor.as_deref(), Some("Link"));
        assert_eq!(parsed.links[0].tag, "a");
    }

    #[test]
    fn test_base_tag_overrides_resolution() {
        let html = r#"<html><head><base href="https://cdn.example.com/assets/"></head>
            <body><a href="doc">Doc</a></body></html>"#;
        let parsed = parse(html);
        assert_eq!(parsed.links[0].url, "https://cdn.example.com/assets/doc");
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r#"<html><body>
            <a href="javascript:void(0)">Js</a>
            <a href="mailto:test@example.com">Mail</a>
            <a href="tel:+123">Tel</a>
            <a href="data:text/html,x">Data</a>
        </body></html>"#;
        assert!(parse(html).links.is_empty());
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<html><body><a href="#section">Jump</a></body></html>"##;
        assert!(parse(html).links.is_empty());
    }

    #[test]
    fn test_skip_download_link() {
        let html = r#"<html><body><a href="/file.pdf" download>Get</a></body></html>"#;
        assert!(parse(html).links.is_empty());
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/page2" rel="nofollow">Link</a></body></html>"#;
        assert_eq!(parse(html).links.len(), 1);
    }

    #[test]
    fn test_extract_canonical_and_iframe() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canon"></head>
            <body><iframe src="/embedded"></iframe></body></html>"#;
        let parsed = parse(html);
        let tags: Vec<&str> = parsed.links.iter().map(|l| l.tag.as_str()).collect();
        assert!(tags.contains(&"link"));
        assert!(tags.contains(&"iframe"));
    }

    #[test]
    fn test_duplicate_links_collapsed() {
        let html = r#"<html><body>
            <a href="/a">One</a>
            <a href="/a#top">Same after canonicalization</a>
            <a href="/b">Two</a>
        </body></html>"#;
        assert_eq!(parse(html).links.len(), 2);
    }

    #[test]
    fn test_link_cap_applies() {
        let mut html = String::from("<html><body>");
        for i in 0..20 {
            html.push_str(&format!(r#"<a href="/p{}">l</a>"#, i));
        }
        html.push_str("</body></html>");
        let parsed = parse_html(&html, &base_url(), 7).unwrap();
        assert_eq!(parsed.links.len(), 7);
    }

    #[test]
    fn test_plain_text_content() {
        let parsed = parse_content(
            b"plain text body",
            Some("text/plain"),
            &base_url(),
            5000,
            false,
        )
        .unwrap();
        assert_eq!(parsed.text, "plain text body");
        assert!(parsed.links.is_empty());
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_binary_content_rejected_by_default() {
        let result = parse_content(&[0u8; 16], Some("image/png"), &base_url(), 5000, false);
        assert!(matches!(
            result,
            Err(PageParseError::DisallowedContentType(_))
        ));
    }

    #[test]
    fn test_binary_content_passed_through_when_included() {
        let parsed =
            parse_content(&[0u8; 16], Some("application/pdf"), &base_url(), 5000, true).unwrap();
        assert!(parsed.links.is_empty());
        assert!(parsed.text.is_empty());
    }

    #[test]
    fn test_xhtml_is_parsed_as_html() {
        let parsed = parse_content(
            br#"<html><head><title>X</title></head><body><a href="/x">x</a></body></html>"#,
            Some("application/xhtml+xml"),
            &base_url(),
            5000,
            false,
        )
        .unwrap();
        assert_eq!(parsed.title, Some("X".to_string()));
        assert_eq!(parsed.links.len(), 1);
    }

    #[test]
    fn test_missing_content_type_treated_as_html() {
        let parsed = parse_content(
            br#"<html><body><a href="/y">y</a></body></html>"#,
            None,
            &base_url(),
            5000,
            false,
        )
        .unwrap();
        assert_eq!(parsed.links.len(), 1);
    }
}
