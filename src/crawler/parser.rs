//! HTML parsing for rendered pages
//!
//! This module handles parsing rendered HTML to extract:
//! - Links to follow (from <a> tags)
//! - Page title
//! - Sitemap URL entries
//! - Anti-bot challenge markers

use scraper::{Html, Selector};
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All links found on the page (absolute URLs)
    pub links: Vec<String>,
}

/// Parses rendered HTML and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:** `<a href="...">` tags anywhere in the document.
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only anchors
///
/// Relative hrefs resolve against `base_url`, which should be the page's
/// final URL so redirected pages resolve correctly.
///
/// # Example
///
/// ```no_run
/// use sitelens::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Extracts URL entries from a rendered sitemap document
///
/// Sitemaps are XML, but the renderer hands back whatever DOM the browser
/// built for it, so this parses leniently and collects the text of every
/// `<loc>` element. Entries that do not parse as http(s) URLs are dropped.
pub fn extract_sitemap_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    let Ok(loc_selector) = Selector::parse("loc") else {
        return Vec::new();
    };

    document
        .select(&loc_selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|loc| {
            Url::parse(loc)
                .map(|u| u.scheme() == "http" || u.scheme() == "https")
                .unwrap_or(false)
        })
        .collect()
}

/// Checks rendered HTML for anti-bot challenge markers
///
/// `selectors` come from configuration and cover the common CAPTCHA and
/// challenge-interstitial element patterns. Invalid selectors are skipped.
pub fn detect_challenge(html: &str, selectors: &[String]) -> bool {
    let document = Html::parse_document(html);

    selectors.iter().any(|raw| {
        Selector::parse(raw)
            .map(|selector| document.select(&selector).next().is_some())
            .unwrap_or(false)
    })
}
