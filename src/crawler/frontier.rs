//! Crawl frontier: discovery planning, URL queue, and visited-set
//!
//! The frontier decides which URLs a run will visit. Discovery is
//! sitemap-authoritative: when the site's sitemap yields at least one
//! same-origin URL, that list is the complete crawl plan and recursive
//! link-following is never engaged for the run. Otherwise the frontier
//! starts from the seed alone and grows from links harvested per wave.

use crate::config::CrawlerConfig;
use crate::renderer::RendererPool;
use crate::url::{is_within_origin, normalize_url};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct FrontierState {
    /// URLs waiting to be fetched, in discovery order
    pending: VecDeque<String>,

    /// Every URL ever enqueued; superset of `visited`
    enqueued: HashSet<String>,

    /// URLs already selected for a fetch
    visited: HashSet<String>,
}

/// Shared crawl frontier
///
/// All mutation goes through one mutex-guarded state, so concurrent fetches
/// within a wave can report discoveries without racing the dedup.
pub struct FrontierManager {
    origin: String,
    state: Mutex<FrontierState>,
    used_sitemap: AtomicBool,
}

impl FrontierManager {
    /// Creates a frontier seeded with a single normalized URL
    pub fn new(seed: &str, origin: &str) -> Self {
        let mut enqueued = HashSet::new();
        enqueued.insert(seed.to_string());

        let mut pending = VecDeque::new();
        pending.push_back(seed.to_string());

        Self {
            origin: origin.to_string(),
            state: Mutex::new(FrontierState {
                pending,
                enqueued,
                visited: HashSet::new(),
            }),
            used_sitemap: AtomicBool::new(false),
        }
    }

    /// Plans the run's URL set before the first wave
    ///
    /// For single-page runs this is a no-op and the plan stays at the seed.
    /// For whole-site runs it fetches `{origin}/sitemap.xml` through a
    /// pooled renderer page; any same-origin entries found become the
    /// authoritative plan and mark the run as sitemap-driven. A missing,
    /// failed, or empty sitemap quietly falls back to recursive discovery.
    pub async fn plan_discovery(
        &self,
        pool: &RendererPool,
        config: &CrawlerConfig,
        crawl_entire_website: bool,
    ) {
        if !crawl_entire_website {
            return;
        }

        let sitemap_url = format!("{}/sitemap.xml", self.origin);
        let urls = match self.fetch_sitemap(pool, config, &sitemap_url).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!("Sitemap fetch failed for {}: {}", sitemap_url, e);
                return;
            }
        };

        let mut scoped = Vec::new();
        for raw in urls {
            match normalize_url(&raw) {
                Ok(normalized) if is_within_origin(&normalized, &self.origin) => {
                    scoped.push(normalized.to_string());
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping malformed sitemap entry {}: {}", raw, e),
            }
        }

        if scoped.is_empty() {
            tracing::debug!("Sitemap at {} yielded no usable URLs", sitemap_url);
            return;
        }

        tracing::info!("Sitemap provided {} URLs; crawl plan is fixed", scoped.len());
        self.used_sitemap.store(true, Ordering::SeqCst);
        self.adopt(scoped);
    }

    /// Replaces the frontier contents with the sitemap's closed URL set
    ///
    /// The pre-seeded queue is discarded: a seed the sitemap does not list
    /// is not part of the plan.
    fn adopt(&self, urls: Vec<String>) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.enqueued.clear();
        for url in urls {
            if state.enqueued.insert(url.clone()) {
                state.pending.push_back(url);
            }
        }
    }

    async fn fetch_sitemap(
        &self,
        pool: &RendererPool,
        config: &CrawlerConfig,
        sitemap_url: &str,
    ) -> Result<Vec<String>, crate::renderer::RendererError> {
        let instance = pool.acquire().await?;
        let mut page = instance.new_page().await?;

        let outcome = async {
            let response = page
                .navigate(
                    sitemap_url,
                    config.wait_policy,
                    Duration::from_secs(config.navigation_timeout_secs),
                )
                .await?;

            if response.status >= 400 {
                return Ok(Vec::new());
            }

            let content = page.content().await?;
            Ok(super::parser::extract_sitemap_urls(&content))
        }
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close sitemap page: {}", e);
        }

        outcome
    }

    /// Enqueues URLs not seen before; duplicates are dropped silently
    pub fn enqueue(&self, urls: impl IntoIterator<Item = String>) {
        let mut state = self.state.lock().unwrap();
        for url in urls {
            if state.enqueued.insert(url.clone()) {
                state.pending.push_back(url);
            }
        }
    }

    /// Takes the next wave of up to `size` URLs, marking each as visited
    pub fn next_batch(&self, size: usize) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let mut batch = Vec::with_capacity(size);

        while batch.len() < size {
            let Some(url) = state.pending.pop_front() else {
                break;
            };
            if state.visited.insert(url.clone()) {
                batch.push(url);
            }
        }

        batch
    }

    /// Filters a page's discovered links down to not-yet-visited ones,
    /// deduplicating within the input
    pub fn filter_unvisited(&self, urls: Vec<String>) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut seen = HashSet::new();
        urls.into_iter()
            .filter(|url| !state.visited.contains(url) && seen.insert(url.clone()))
            .collect()
    }

    /// True while URLs remain to be fetched
    pub fn has_pending(&self) -> bool {
        !self.state.lock().unwrap().pending.is_empty()
    }

    /// Count of distinct URLs known to the run (visited + pending)
    pub fn discovered_total(&self) -> usize {
        self.state.lock().unwrap().enqueued.len()
    }

    /// Count of URLs already dispatched
    pub fn visited_count(&self) -> usize {
        self.state.lock().unwrap().visited.len()
    }

    /// Whether discovery settled on the sitemap plan
    pub fn used_sitemap(&self) -> bool {
        self.used_sitemap.load(Ordering::SeqCst)
    }
}
