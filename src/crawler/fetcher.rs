//! Single-URL fetch pipeline
//!
//! Drives one renderer page through navigation, status classification,
//! anti-bot detection, screenshot capture, link harvesting, and the
//! optional accessibility audit. A fetch never propagates an error to its
//! caller: every failure becomes a [`CrawlResult`] with an error string, so
//! one bad page can never abort a batch.

use super::frontier::FrontierManager;
use super::parser;
use crate::audit::{AccessibilityAuditor, AccessibilityReport, ConformanceLevels};
use crate::config::CrawlerConfig;
use crate::renderer::{NavigationErrorKind, RendererError, RendererPage, RendererPool};
use crate::url::{is_within_origin, normalize_url};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fixed user-agent rotation; one is picked at random per fetch
const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Per-fetch behavior derived from the crawl request
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub take_screenshots: bool,
    pub collect_links: bool,
    pub check_accessibility: bool,
    pub conformance: ConformanceLevels,
    pub increase_timeout: bool,
}

/// Outcome of one attempted URL, success or failure
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Screenshot filename relative to the screenshot directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,

    /// Newly discovered same-origin links, excluding already-visited
    pub links: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilityReport>,
}

impl CrawlResult {
    pub(crate) fn error(url: &str, message: String) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            screenshot: None,
            links: Vec::new(),
            error: Some(message),
            accessibility: None,
        }
    }
}

/// Maps an HTTP response status to an error string, or None for usable pages
///
/// 403/429 are called out distinctly from generic client errors because
/// they imply the site is refusing automation, not that the page is broken.
/// 204/205/304/407 carry no usable document to analyze.
pub fn classify_status(status: u16) -> Option<String> {
    match status {
        204 | 205 => Some(format!("No usable content (HTTP {})", status)),
        304 => Some("Page not modified (304), no usable content".to_string()),
        403 => Some("Access forbidden (403)".to_string()),
        407 => Some("Proxy authentication required (407)".to_string()),
        429 => Some("Rate limit exceeded (429): Too many requests".to_string()),
        s if s >= 400 => Some(format!("HTTP Error {}", s)),
        _ => None,
    }
}

/// Maps a renderer-boundary failure to the same error taxonomy
///
/// A draining pool is the system refusing work, not the page failing, so it
/// keeps a distinguishable message instead of the navigation wording.
fn describe_renderer_error(error: &RendererError) -> String {
    match error {
        RendererError::PoolDraining => {
            "System busy: crawler is shutting down, page not processed".to_string()
        }
        RendererError::Timeout => NavigationErrorKind::Timeout.message(),
        RendererError::Navigation(raw) => NavigationErrorKind::classify(raw).message(),
        other => other.to_string(),
    }
}

/// Fetches single URLs using pooled renderer instances
pub struct PageFetcher {
    pool: Arc<RendererPool>,
    auditor: Arc<AccessibilityAuditor>,
    config: CrawlerConfig,
    screenshot_dir: PathBuf,
}

impl PageFetcher {
    pub fn new(
        pool: Arc<RendererPool>,
        auditor: Arc<AccessibilityAuditor>,
        config: CrawlerConfig,
        screenshot_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            auditor,
            config,
            screenshot_dir,
        }
    }

    /// Fetches one URL; always returns a result, never an error
    ///
    /// The caller must have marked `url` as visited before dispatch; that
    /// de-dup is advisory, racing duplicates only waste a fetch.
    pub async fn fetch(
        &self,
        url: &str,
        frontier: &FrontierManager,
        origin: &str,
        options: &FetchOptions,
    ) -> CrawlResult {
        if let Some(host) = self.blocked_host(url) {
            tracing::debug!("Refusing known-blocked host {}", host);
            return CrawlResult::error(
                url,
                format!("Host {} is known to block automated crawlers", host),
            );
        }

        match self.fetch_inner(url, frontier, origin, options).await {
            Ok(result) => result,
            Err(e) => CrawlResult::error(url, describe_renderer_error(&e)),
        }
    }

    fn blocked_host(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        self.config
            .blocked_hosts
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(&host))
            .then_some(host)
    }

    async fn fetch_inner(
        &self,
        url: &str,
        frontier: &FrontierManager,
        origin: &str,
        options: &FetchOptions,
    ) -> Result<CrawlResult, RendererError> {
        let instance = self.pool.acquire().await?;
        let mut page = instance.new_page().await?;

        let outcome = self
            .drive_page(page.as_mut(), url, frontier, origin, options)
            .await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", url, e);
        }

        outcome
    }

    async fn drive_page(
        &self,
        page: &mut dyn RendererPage,
        url: &str,
        frontier: &FrontierManager,
        origin: &str,
        options: &FetchOptions,
    ) -> Result<CrawlResult, RendererError> {
        let agent = USER_AGENTS.choose(&mut rand::thread_rng()).copied();
        if let Some(agent) = agent {
            page.set_user_agent(agent).await?;
        }

        let mut timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        if options.increase_timeout {
            timeout *= 2;
        }

        let response = page.navigate(url, self.config.wait_policy, timeout).await?;

        if let Some(status_error) = classify_status(response.status) {
            tracing::debug!("{} answered {}: {}", url, response.status, status_error);
            return Ok(CrawlResult::error(url, status_error));
        }

        let content = page.content().await?;

        if parser::detect_challenge(&content, &self.config.challenge_selectors) {
            tracing::info!("Anti-bot challenge detected on {}", url);
            return Ok(CrawlResult::error(
                url,
                "Blocked by anti-bot challenge page".to_string(),
            ));
        }

        self.settle(page).await;

        // Re-read after the settle window so late-rendering content counts
        let content = page.content().await.unwrap_or(content);

        let mut screenshot = None;
        if options.take_screenshots {
            screenshot = self.capture_screenshot(page, url).await;
        }

        let final_url = Url::parse(&response.final_url)
            .or_else(|_| Url::parse(url))
            .map_err(|e| RendererError::Page(format!("Unparseable page URL: {}", e)))?;

        let parsed = parser::parse_html(&content, &final_url);

        let links = if options.collect_links {
            self.scope_links(parsed.links, frontier, origin)
        } else {
            Vec::new()
        };

        let accessibility = if options.check_accessibility {
            Some(
                self.auditor
                    .audit(&final_url, &content, options.conformance, &self.screenshot_dir)
                    .await,
            )
        } else {
            None
        };

        Ok(CrawlResult {
            url: url.to_string(),
            title: parsed.title,
            screenshot,
            links,
            error: None,
            accessibility,
        })
    }

    /// Bounded best-effort wait for document-ready plus a settle delay for
    /// dynamic content; failures are logged, never fatal
    async fn settle(&self, page: &mut dyn RendererPage) {
        for _ in 0..10 {
            match page.evaluate("document.readyState").await {
                Ok(value) if value == serde_json::json!("complete") => break,
                Ok(_) => tokio::time::sleep(Duration::from_millis(200)).await,
                Err(e) => {
                    tracing::debug!("Readiness probe failed: {}", e);
                    break;
                }
            }
        }

        if self.config.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        }
    }

    /// Captures a full-page screenshot under a collision-free filename
    ///
    /// The name hashes the URL and appends a timestamp, so repeated crawls
    /// of the same URL never overwrite each other.
    async fn capture_screenshot(&self, page: &mut dyn RendererPage, url: &str) -> Option<String> {
        if let Err(e) = std::fs::create_dir_all(&self.screenshot_dir) {
            tracing::warn!("Cannot create screenshot directory: {}", e);
            return None;
        }

        let url_hash = hex::encode(&Sha256::digest(url.as_bytes())[..8]);
        let filename = format!("{}_{}.png", url_hash, Utc::now().timestamp_millis());
        let path = self.screenshot_dir.join(&filename);

        match page.screenshot(&path, true).await {
            Ok(()) => Some(filename),
            Err(e) => {
                tracing::warn!("Screenshot failed for {}: {}", url, e);
                None
            }
        }
    }

    /// Normalizes harvested links and keeps same-origin, unvisited ones
    fn scope_links(
        &self,
        links: Vec<String>,
        frontier: &FrontierManager,
        origin: &str,
    ) -> Vec<String> {
        let mut scoped = Vec::new();
        for link in links {
            let Ok(normalized) = normalize_url(&link) else {
                continue;
            };
            if is_within_origin(&normalized, origin) {
                scoped.push(normalized.to_string());
            }
        }
        frontier.filter_unvisited(scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::renderer::mock::MockRenderer;

    #[test]
    fn test_status_table_forbidden() {
        assert!(classify_status(403).unwrap().contains("forbidden"));
    }

    #[test]
    fn test_status_table_rate_limited() {
        let message = classify_status(429).unwrap();
        assert!(message.contains("Rate limit") || message.contains("Too many requests"));
    }

    #[test]
    fn test_status_table_not_modified() {
        assert!(classify_status(304).unwrap().contains("not modified"));
    }

    #[test]
    fn test_status_table_server_error_is_generic() {
        assert_eq!(classify_status(500).unwrap(), "HTTP Error 500");
        assert_eq!(classify_status(502).unwrap(), "HTTP Error 502");
    }

    #[test]
    fn test_status_table_success_passes() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(301), None);
    }

    #[test]
    fn test_dns_failure_message() {
        let error = RendererError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert!(describe_renderer_error(&error).contains("not resolved"));
    }

    fn fetcher_with(
        renderer: Arc<MockRenderer>,
        dir: &tempfile::TempDir,
    ) -> (PageFetcher, FrontierManager) {
        let script_path = dir.path().join("engine.js");
        std::fs::write(&script_path, "window.axe = {};").unwrap();

        let pool = Arc::new(RendererPool::new(renderer.clone(), 1));
        let audit_config = AuditConfig {
            rule_script_path: script_path.display().to_string(),
            ..AuditConfig::default()
        };
        let auditor = Arc::new(AccessibilityAuditor::new(audit_config, renderer));

        let config = CrawlerConfig {
            settle_delay_ms: 0,
            ..CrawlerConfig::default()
        };
        let fetcher = PageFetcher::new(pool, auditor, config, dir.path().to_path_buf());
        let frontier = FrontierManager::new("https://example.com/", "https://example.com");
        (fetcher, frontier)
    }

    #[tokio::test]
    async fn test_blocked_host_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        let (fetcher, frontier) = fetcher_with(renderer.clone(), &dir);

        let result = fetcher
            .fetch(
                "https://www.linkedin.com/company/x",
                &frontier,
                "https://www.linkedin.com",
                &FetchOptions::default(),
            )
            .await;

        assert!(result.error.unwrap().contains("linkedin.com"));
        assert!(renderer.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_successful_fetch_scopes_links() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/",
            r#"<html><head><title>Home</title></head><body>
                <a href="/about">About</a>
                <a href="/about#team">Team</a>
                <a href="https://elsewhere.com/">Away</a>
            </body></html>"#,
        );
        let (fetcher, frontier) = fetcher_with(renderer, &dir);
        frontier.next_batch(1);

        let options = FetchOptions {
            collect_links: true,
            ..FetchOptions::default()
        };
        let result = fetcher
            .fetch("https://example.com/", &frontier, "https://example.com", &options)
            .await;

        assert!(result.error.is_none());
        assert_eq!(result.title, Some("Home".to_string()));
        assert_eq!(result.links, vec!["https://example.com/about"]);
    }

    #[tokio::test]
    async fn test_error_status_yields_empty_links() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_status(
            "https://example.com/gone",
            500,
            r#"<html><body><a href="/should-not-appear">x</a></body></html>"#,
        );
        let (fetcher, frontier) = fetcher_with(renderer, &dir);

        let options = FetchOptions {
            collect_links: true,
            ..FetchOptions::default()
        };
        let result = fetcher
            .fetch(
                "https://example.com/gone",
                &frontier,
                "https://example.com",
                &options,
            )
            .await;

        assert_eq!(result.error.as_deref(), Some("HTTP Error 500"));
        assert!(result.links.is_empty());
    }

    #[tokio::test]
    async fn test_challenge_page_reports_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/",
            r#"<html><body><div class="g-recaptcha"></div></body></html>"#,
        );
        let (fetcher, frontier) = fetcher_with(renderer, &dir);

        let result = fetcher
            .fetch(
                "https://example.com/",
                &frontier,
                "https://example.com",
                &FetchOptions::default(),
            )
            .await;

        assert!(result.error.unwrap().contains("challenge"));
    }

    #[tokio::test]
    async fn test_navigation_failure_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_nav_error("https://nosuch.example/", "net::ERR_NAME_NOT_RESOLVED");
        let (fetcher, frontier) = fetcher_with(renderer, &dir);

        let result = fetcher
            .fetch(
                "https://nosuch.example/",
                &frontier,
                "https://nosuch.example",
                &FetchOptions::default(),
            )
            .await;

        assert!(result.error.unwrap().contains("not resolved"));
    }

    #[tokio::test]
    async fn test_draining_pool_reports_system_busy() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page("https://example.com/", "<html><body></body></html>");

        let pool = Arc::new(RendererPool::new(renderer.clone(), 1));
        pool.acquire().await.unwrap();
        renderer.set_close_delay(Duration::from_millis(200));
        let draining = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.release_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let auditor = Arc::new(AccessibilityAuditor::new(
            AuditConfig::default(),
            renderer.clone(),
        ));
        let config = CrawlerConfig {
            settle_delay_ms: 0,
            ..CrawlerConfig::default()
        };
        let fetcher = PageFetcher::new(pool, auditor, config, dir.path().to_path_buf());
        let frontier = FrontierManager::new("https://example.com/", "https://example.com");

        let result = fetcher
            .fetch(
                "https://example.com/",
                &frontier,
                "https://example.com",
                &FetchOptions::default(),
            )
            .await;

        assert!(result.error.unwrap().starts_with("System busy"));
        assert!(renderer.navigations().is_empty());
        draining.await.unwrap();
    }

    #[tokio::test]
    async fn test_screenshot_written_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page("https://example.com/", "<html><body>hi</body></html>");
        let (fetcher, frontier) = fetcher_with(renderer, &dir);

        let options = FetchOptions {
            take_screenshots: true,
            ..FetchOptions::default()
        };
        let result = fetcher
            .fetch("https://example.com/", &frontier, "https://example.com", &options)
            .await;

        let filename = result.screenshot.unwrap();
        assert!(dir.path().join(&filename).exists());
        assert!(filename.ends_with(".png"));
    }
}
