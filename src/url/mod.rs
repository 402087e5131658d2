//! URL handling module for Sitelens
//!
//! This module provides URL normalization and the origin-scoping rule that
//! decides whether a discovered link belongs to the crawl.

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Computes the origin base string for a crawl seed
///
/// The base is `scheme://host[:port]` with the host lowercased. Every
/// discovered link is kept only if its normalized absolute form starts with
/// this base, so `https://example.com` scopes the crawl to that host while
/// excluding `https://example.org` and `https://sub.example.com`.
///
/// # Examples
///
/// ```
/// use sitelens::url::origin_base;
/// use url::Url;
///
/// let seed = Url::parse("https://Example.COM/some/page").unwrap();
/// assert_eq!(origin_base(&seed), "https://example.com");
/// ```
pub fn origin_base(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Returns true if `url` falls inside the crawl origin
///
/// A URL is in scope when its string form is prefixed by the origin base.
/// Prefix matching (rather than host equality) keeps the rule cheap and
/// matches what gets stored in the visited-set.
pub fn is_within_origin(url: &Url, origin: &str) -> bool {
    url.as_str().starts_with(origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_base_simple() {
        let url = Url::parse("https://example.com/path?q=1").unwrap();
        assert_eq!(origin_base(&url), "https://example.com");
    }

    #[test]
    fn test_origin_base_lowercases_host() {
        let url = Url::parse("https://EXAMPLE.com/").unwrap();
        assert_eq!(origin_base(&url), "https://example.com");
    }

    #[test]
    fn test_origin_base_keeps_port() {
        let url = Url::parse("http://127.0.0.1:8080/index").unwrap();
        assert_eq!(origin_base(&url), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_same_origin_link() {
        let origin = "https://example.com";
        let url = Url::parse("https://example.com/about").unwrap();
        assert!(is_within_origin(&url, origin));
    }

    #[test]
    fn test_cross_origin_link() {
        let origin = "https://example.com";
        let url = Url::parse("https://other.test/about").unwrap();
        assert!(!is_within_origin(&url, origin));
    }

    #[test]
    fn test_subdomain_is_not_in_origin() {
        let origin = "https://example.com";
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert!(!is_within_origin(&url, origin));
    }

    #[test]
    fn test_scheme_mismatch_is_not_in_origin() {
        let origin = "https://example.com";
        let url = Url::parse("http://example.com/about").unwrap();
        assert!(!is_within_origin(&url, origin));
    }
}
