//! Sitelens: a streaming site crawler with screenshots and accessibility audits
//!
//! This crate crawls a website from a seed URL, optionally discovering every
//! in-domain page (sitemap first, recursive link-following as fallback),
//! captures full-page screenshots, runs a WCAG rule-engine audit against each
//! rendered page, and streams incremental progress frames to the caller.

pub mod audit;
pub mod config;
pub mod crawler;
pub mod renderer;
pub mod server;
pub mod url;

use thiserror::Error;

/// Main error type for Sitelens operations
///
/// Per-page and per-audit failures never surface here; they are converted
/// into result data by the fetch and audit layers. This type covers the
/// request-level and setup failures that abort a whole run.
#[derive(Debug, Error)]
pub enum LensError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] renderer::RendererError),

    #[error("Missing seed URL")]
    MissingUrl,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sitelens operations
pub type Result<T> = std::result::Result<T, LensError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use audit::{AccessibilityReport, ConformanceLevels};
pub use config::Config;
pub use crawler::{CrawlRequest, CrawlResult, ProgressFrame};
pub use renderer::{Renderer, RendererError, RendererPool};
