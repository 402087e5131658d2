//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Renderer-driven page fetching with status classification
//! - HTML parsing, link extraction, and anti-bot detection
//! - Frontier management (sitemap planning, visited-set, batching)
//! - Wave-by-wave orchestration with streamed progress frames

mod fetcher;
mod frontier;
mod orchestrator;
mod parser;

pub use fetcher::{classify_status, CrawlResult, FetchOptions, PageFetcher};
pub use frontier::FrontierManager;
pub use orchestrator::{run_crawl, CrawlRequest, Progress, ProgressFrame};
pub use parser::{extract_sitemap_urls, parse_html, ParsedPage};
