//! Top-level crawl state machine
//!
//! One `run_crawl` call services one crawl request end to end: discovery
//! planning, wave-by-wave concurrent fetching, incremental progress frames
//! over a channel, and unconditional renderer teardown. Waves run strictly
//! in sequence; fetches within a wave fan out up to the request's
//! concurrency and fan back in before the wave's frame is emitted.

use super::fetcher::{CrawlResult, FetchOptions, PageFetcher};
use super::frontier::FrontierManager;
use crate::audit::{AccessibilityAuditor, ConformanceLevels};
use crate::config::Config;
use crate::renderer::{Renderer, RendererPool};
use crate::url::{normalize_url, origin_base};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One crawl request, immutable for the run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub take_screenshots: bool,

    #[serde(default)]
    pub crawl_entire_website: bool,

    #[serde(default)]
    pub check_accessibility: bool,

    #[serde(default)]
    pub wcag_levels: ConformanceLevels,

    #[serde(default)]
    pub increase_timeout: bool,

    #[serde(default)]
    pub slow_rate_limit: bool,

    #[serde(default = "default_concurrent_pages")]
    pub concurrent_pages: u32,
}

fn default_concurrent_pages() -> u32 {
    1
}

impl CrawlRequest {
    /// Requested concurrency clamped to the supported 1..=5 window
    pub fn concurrency(&self) -> usize {
        (self.concurrent_pages as usize).clamp(1, 5)
    }
}

/// Wave progress counters
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    /// URLs with a result so far
    pub current: usize,

    /// Distinct URLs known to the run; grows during recursive discovery
    pub total: usize,
}

/// One streamed unit of crawl output
///
/// A run emits zero or more `Update` frames followed by exactly one
/// `Complete` frame, unless the client disconnects first. `Error` replaces
/// everything when the request itself is unusable.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressFrame {
    #[serde(rename_all = "camelCase")]
    Update {
        /// Only this wave's results, keeping frame size bounded
        new_results: Vec<CrawlResult>,
        used_sitemap: bool,
        is_complete: bool,
        progress: Progress,
    },

    #[serde(rename_all = "camelCase")]
    Complete {
        /// The full accumulated result set
        results: Vec<CrawlResult>,
        used_sitemap: bool,
        is_complete: bool,
    },

    Error {
        error: String,
    },
}

/// Runs one complete crawl, streaming frames into `tx`
///
/// A send failure means the client went away; the run stops after the
/// current wave and skips the terminal frame. Renderer teardown happens on
/// every exit path.
pub async fn run_crawl(
    config: Arc<Config>,
    renderer: Arc<dyn Renderer>,
    request: CrawlRequest,
    tx: mpsc::Sender<ProgressFrame>,
) {
    let seed_url = match normalize_url(&request.url) {
        Ok(seed_url) => seed_url,
        Err(e) => {
            tracing::warn!("Rejecting crawl request for {:?}: {}", request.url, e);
            let _ = tx
                .send(ProgressFrame::Error {
                    error: format!("Invalid URL: {}", e),
                })
                .await;
            return;
        }
    };

    let seed = seed_url.to_string();
    let origin = origin_base(&seed_url);

    tracing::info!(
        "Starting crawl of {} (whole site: {}, concurrency: {})",
        seed,
        request.crawl_entire_website,
        request.concurrency()
    );

    let pool = Arc::new(RendererPool::new(
        Arc::clone(&renderer),
        config.renderer.pool_size,
    ));

    crawl_loop(&config, &pool, renderer, &request, &seed, &origin, &tx).await;

    pool.release_all().await;
    tracing::info!("Crawl of {} finished, renderer pool released", seed);
}

#[allow(clippy::too_many_arguments)]
async fn crawl_loop(
    config: &Config,
    pool: &Arc<RendererPool>,
    renderer: Arc<dyn Renderer>,
    request: &CrawlRequest,
    seed: &str,
    origin: &str,
    tx: &mpsc::Sender<ProgressFrame>,
) {
    let frontier = Arc::new(FrontierManager::new(seed, origin));
    frontier
        .plan_discovery(pool, &config.crawler, request.crawl_entire_website)
        .await;
    let used_sitemap = frontier.used_sitemap();

    let auditor = Arc::new(AccessibilityAuditor::new(config.audit.clone(), renderer));
    let fetcher = PageFetcher::new(
        Arc::clone(pool),
        auditor,
        config.crawler.clone(),
        PathBuf::from(&config.server.screenshot_dir),
    );

    let options = FetchOptions {
        take_screenshots: request.take_screenshots,
        // Link harvesting only drives discovery when the sitemap did not
        // already fix the plan
        collect_links: request.crawl_entire_website && !used_sitemap,
        check_accessibility: request.check_accessibility,
        conformance: request.wcag_levels,
        increase_timeout: request.increase_timeout,
    };

    let per_page_timeout = page_timeout(config, request);
    let batch_timeout = Duration::from_secs(config.crawler.batch_timeout_secs);

    let mut results: Vec<CrawlResult> = Vec::new();

    loop {
        let batch = frontier.next_batch(request.concurrency());
        if batch.is_empty() {
            break;
        }

        let wave_results = run_wave(
            &fetcher,
            &frontier,
            origin,
            &options,
            &batch,
            per_page_timeout,
            batch_timeout,
        )
        .await;

        if options.collect_links {
            let discovered: Vec<String> = wave_results
                .iter()
                .flat_map(|result| result.links.iter().cloned())
                .collect();
            frontier.enqueue(discovered);
        }

        results.extend(wave_results.iter().cloned());

        let frame = ProgressFrame::Update {
            new_results: wave_results,
            used_sitemap,
            is_complete: false,
            progress: Progress {
                current: results.len(),
                total: frontier.discovered_total(),
            },
        };
        if tx.send(frame).await.is_err() {
            tracing::info!("Client disconnected, cancelling crawl of {}", seed);
            return;
        }

        if request.slow_rate_limit && frontier.has_pending() {
            tokio::time::sleep(Duration::from_millis(config.crawler.wave_delay_ms)).await;
        }
    }

    let _ = tx
        .send(ProgressFrame::Complete {
            results,
            used_sitemap,
            is_complete: true,
        })
        .await;
}

/// Fans out one wave of fetches and fans back in
///
/// Each fetch carries its own timeout, and the wave as a whole carries a
/// second one; a page that outlives either becomes a timeout error result
/// rather than stalling the run.
async fn run_wave(
    fetcher: &PageFetcher,
    frontier: &FrontierManager,
    origin: &str,
    options: &FetchOptions,
    batch: &[String],
    per_page_timeout: Duration,
    batch_timeout: Duration,
) -> Vec<CrawlResult> {
    let mut pending: FuturesUnordered<_> = batch
        .iter()
        .map(|url| async move {
            match tokio::time::timeout(
                per_page_timeout,
                fetcher.fetch(url, frontier, origin, options),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => CrawlResult::error(url, "Page processing timed out".to_string()),
            }
        })
        .collect();

    let deadline = tokio::time::Instant::now() + batch_timeout;
    let mut wave_results = Vec::with_capacity(batch.len());

    loop {
        match tokio::time::timeout_at(deadline, pending.next()).await {
            Ok(Some(result)) => wave_results.push(result),
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("Batch timed out with {} fetches unfinished", pending.len());
                let finished: HashSet<String> =
                    wave_results.iter().map(|r| r.url.clone()).collect();
                for url in batch {
                    if !finished.contains(url.as_str()) {
                        wave_results.push(CrawlResult::error(
                            url,
                            "Page processing timed out".to_string(),
                        ));
                    }
                }
                break;
            }
        }
    }

    wave_results
}

/// Generous per-page budget: navigation (possibly doubled), settle time,
/// and the full audit retry envelope when auditing is on
fn page_timeout(config: &Config, request: &CrawlRequest) -> Duration {
    let mut nav_secs = config.crawler.navigation_timeout_secs;
    if request.increase_timeout {
        nav_secs *= 2;
    }

    let mut budget = Duration::from_secs(nav_secs)
        + Duration::from_millis(config.crawler.settle_delay_ms)
        + Duration::from_secs(30);

    if request.check_accessibility {
        budget += Duration::from_secs(
            config.audit.attempt_timeout_secs * u64::from(config.audit.max_attempts),
        );
    }

    budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockRenderer;

    fn test_config(dir: &tempfile::TempDir) -> Arc<Config> {
        let mut config = Config::default();
        config.server.screenshot_dir = dir.path().display().to_string();
        config.crawler.settle_delay_ms = 0;
        config.crawler.wave_delay_ms = 0;
        Arc::new(config)
    }

    fn request(url: &str, whole_site: bool, concurrency: u32) -> CrawlRequest {
        CrawlRequest {
            url: url.to_string(),
            take_screenshots: false,
            crawl_entire_website: whole_site,
            check_accessibility: false,
            wcag_levels: ConformanceLevels::default(),
            increase_timeout: false,
            slow_rate_limit: false,
            concurrent_pages: concurrency,
        }
    }

    async fn collect_frames(
        config: Arc<Config>,
        renderer: Arc<MockRenderer>,
        req: CrawlRequest,
    ) -> Vec<ProgressFrame> {
        let (tx, mut rx) = mpsc::channel(64);
        run_crawl(config, renderer, req, tx).await;

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_concurrency_is_clamped() {
        assert_eq!(request("https://x.test/", false, 0).concurrency(), 1);
        assert_eq!(request("https://x.test/", false, 3).concurrency(), 3);
        assert_eq!(request("https://x.test/", false, 99).concurrency(), 5);
    }

    #[test]
    fn test_request_defaults() {
        let req: CrawlRequest =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(req.url, "https://example.com");
        assert!(!req.crawl_entire_website);
        assert_eq!(req.concurrent_pages, 1);
    }

    #[tokio::test]
    async fn test_invalid_url_emits_single_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        let frames = collect_frames(
            test_config(&dir),
            renderer.clone(),
            request("not a url", false, 1),
        )
        .await;

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], ProgressFrame::Error { .. }));
        assert_eq!(renderer.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_sitemap_streaming_contract() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/sitemap.xml",
            r#"<urlset>
                <url><loc>https://example.com/</loc></url>
                <url><loc>https://example.com/a</loc></url>
                <url><loc>https://example.com/b</loc></url>
            </urlset>"#,
        );
        for path in ["/", "/a", "/b"] {
            renderer.script_page(
                &format!("https://example.com{}", path),
                "<html><head><title>Page</title></head><body></body></html>",
            );
        }

        let frames = collect_frames(
            test_config(&dir),
            renderer.clone(),
            request("https://example.com/", true, 1),
        )
        .await;

        // Three single-result waves, then one terminal frame
        assert_eq!(frames.len(), 4);
        for frame in &frames[..3] {
            match frame {
                ProgressFrame::Update {
                    new_results,
                    used_sitemap,
                    is_complete,
                    ..
                } => {
                    assert_eq!(new_results.len(), 1);
                    assert!(*used_sitemap);
                    assert!(!*is_complete);
                }
                other => panic!("Expected update frame, got {:?}", other),
            }
        }
        match &frames[3] {
            ProgressFrame::Complete {
                results,
                used_sitemap,
                is_complete,
            } => {
                assert_eq!(results.len(), 3);
                assert!(*used_sitemap);
                assert!(*is_complete);
            }
            other => panic!("Expected terminal frame, got {:?}", other),
        }

        // Teardown released every instance
        assert_eq!(renderer.live_count(), 0);
    }

    #[tokio::test]
    async fn test_recursive_discovery_stays_in_origin() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        // No sitemap scripted: discovery falls back to link-following
        renderer.script_page(
            "https://example.com/",
            r#"<html><body>
                <a href="/about">About</a>
                <a href="/contact">Contact</a>
                <a href="https://elsewhere.com/out">Out</a>
            </body></html>"#,
        );
        renderer.script_page("https://example.com/about", "<html><body></body></html>");
        renderer.script_page("https://example.com/contact", "<html><body></body></html>");

        let frames = collect_frames(
            test_config(&dir),
            renderer,
            request("https://example.com/", true, 2),
        )
        .await;

        let Some(ProgressFrame::Complete {
            results,
            used_sitemap,
            ..
        }) = frames.last()
        else {
            panic!("Missing terminal frame");
        };
        assert!(!*used_sitemap);
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(results.len(), 3);
        assert!(urls.contains(&"https://example.com/about"));
        assert!(!urls.iter().any(|u| u.contains("elsewhere.com")));
    }

    #[tokio::test]
    async fn test_single_page_crawl_ignores_links() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/",
            r#"<html><body><a href="/next">Next</a></body></html>"#,
        );

        let frames = collect_frames(
            test_config(&dir),
            renderer.clone(),
            request("https://example.com/", false, 1),
        )
        .await;

        assert_eq!(frames.len(), 2);
        let Some(ProgressFrame::Complete { results, .. }) = frames.last() else {
            panic!("Missing terminal frame");
        };
        assert_eq!(results.len(), 1);
        // Sitemap never probed, /next never visited
        assert_eq!(renderer.navigations(), vec!["https://example.com/"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_page_becomes_timeout_result() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/sitemap.xml",
            r#"<urlset>
                <url><loc>https://example.com/fast</loc></url>
                <url><loc>https://example.com/slow</loc></url>
            </urlset>"#,
        );
        renderer.script_page("https://example.com/fast", "<html><body></body></html>");
        renderer.script_page("https://example.com/slow", "<html><body></body></html>");
        // Far beyond the per-page budget
        renderer.set_nav_delay("https://example.com/slow", Duration::from_secs(3600));

        let frames = collect_frames(
            test_config(&dir),
            renderer.clone(),
            request("https://example.com/", true, 2),
        )
        .await;

        let Some(ProgressFrame::Complete { results, .. }) = frames.last() else {
            panic!("Missing terminal frame");
        };
        assert_eq!(results.len(), 2);

        let fast = results
            .iter()
            .find(|r| r.url == "https://example.com/fast")
            .unwrap();
        assert!(fast.error.is_none());

        let slow = results
            .iter()
            .find(|r| r.url == "https://example.com/slow")
            .unwrap();
        assert_eq!(slow.error.as_deref(), Some("Page processing timed out"));

        assert_eq!(renderer.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_converts_unfinished_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page(
            "https://example.com/sitemap.xml",
            r#"<urlset>
                <url><loc>https://example.com/fast</loc></url>
                <url><loc>https://example.com/slow</loc></url>
            </urlset>"#,
        );
        renderer.script_page("https://example.com/fast", "<html><body></body></html>");
        renderer.script_page("https://example.com/slow", "<html><body></body></html>");
        renderer.set_nav_delay("https://example.com/slow", Duration::from_secs(3600));

        // Batch deadline below the per-page budget, so the wave-level
        // timeout is the one that fires
        let mut config = Config::default();
        config.server.screenshot_dir = dir.path().display().to_string();
        config.crawler.settle_delay_ms = 0;
        config.crawler.wave_delay_ms = 0;
        config.crawler.batch_timeout_secs = 60;

        let frames = collect_frames(
            Arc::new(config),
            renderer.clone(),
            request("https://example.com/", true, 2),
        )
        .await;

        let Some(ProgressFrame::Complete { results, .. }) = frames.last() else {
            panic!("Missing terminal frame");
        };
        assert_eq!(results.len(), 2);
        let slow = results
            .iter()
            .find(|r| r.url == "https://example.com/slow")
            .unwrap();
        assert_eq!(slow.error.as_deref(), Some("Page processing timed out"));
        assert_eq!(renderer.live_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_but_still_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        renderer.script_page("https://example.com/", "<html><body></body></html>");

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        run_crawl(
            test_config(&dir),
            renderer.clone(),
            request("https://example.com/", false, 1),
            tx,
        )
        .await;

        assert_eq!(renderer.live_count(), 0);
    }
}
