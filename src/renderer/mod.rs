//! Renderer capability for Sitelens
//!
//! The crawl core never talks to a browser library directly. It consumes the
//! object-safe traits in this module:
//! - [`Renderer`] launches instances
//! - [`RendererInstance`] hosts independent pages (tabs)
//! - [`RendererPage`] navigates, evaluates script, and captures screenshots
//!
//! `chromium.rs` is the chromiumoxide-backed production adapter, `pool.rs`
//! the bounded instance pool, and `mock.rs` a scripted renderer used by the
//! test suite.

pub mod chromium;
pub mod mock;
mod pool;

pub use chromium::ChromiumRenderer;
pub use pool::RendererPool;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Renderer-boundary error type
#[derive(Debug, Error)]
pub enum RendererError {
    /// Failed to start a renderer instance
    #[error("Failed to launch renderer: {0}")]
    Launch(String),

    /// The pool rejected an acquire because teardown is in flight. This is
    /// a hard precondition violation for callers, surfaced to the client as
    /// "system busy", never as a generic crawl failure.
    #[error("Renderer pool is draining")]
    PoolDraining,

    /// Navigation failed; the payload is the raw engine error text, which
    /// [`NavigationErrorKind::classify`] turns into a structured kind
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The navigation exceeded its timeout
    #[error("Navigation timed out")]
    Timeout,

    /// A page-level operation (evaluate, screenshot, close) failed
    #[error("Page operation failed: {0}")]
    Page(String),
}

/// Navigation completion condition
///
/// `DomContentLoaded` returns once the document has loaded, tolerating pages
/// that keep long-lived connections open; `NetworkIdle` additionally waits
/// for the network to quiesce, catching more late-loading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitPolicy {
    DomContentLoaded,
    NetworkIdle,
}

/// Result of a completed navigation
#[derive(Debug, Clone)]
pub struct NavigationResponse {
    /// The final URL after any redirects
    pub final_url: String,

    /// HTTP status of the main document. 200 when the engine cannot
    /// surface the real status.
    pub status: u16,
}

/// Structured classification of navigation failures
///
/// Produced by a single classification function at the renderer boundary;
/// substring matching against the engine's raw error text lives only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationErrorKind {
    Timeout,
    DnsFailure,
    ConnectionRefused,
    TooManyRedirects,
    Aborted,
    Http2Protocol,
    ProxyAuthRequired,
    Unknown(String),
}

impl NavigationErrorKind {
    /// Classifies a raw renderer error string into a structured kind
    ///
    /// The patterns cover Chromium's `net::ERR_*` codes plus the generic
    /// timeout wording various engine layers produce. Unrecognized text
    /// passes through as `Unknown`.
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();

        if lower.contains("err_name_not_resolved") || lower.contains("name_not_resolved") {
            Self::DnsFailure
        } else if lower.contains("err_connection_refused") {
            Self::ConnectionRefused
        } else if lower.contains("err_too_many_redirects") {
            Self::TooManyRedirects
        } else if lower.contains("err_http2_protocol_error") {
            Self::Http2Protocol
        } else if lower.contains("err_aborted") {
            Self::Aborted
        } else if lower.contains("err_tunnel_connection_failed")
            || lower.contains("err_proxy_auth")
        {
            Self::ProxyAuthRequired
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Unknown(raw.to_string())
        }
    }

    /// Human-readable message for this failure kind
    pub fn message(&self) -> String {
        match self {
            Self::Timeout => "Page load timed out".to_string(),
            Self::DnsFailure => "Domain name not resolved".to_string(),
            Self::ConnectionRefused => "Connection refused by host".to_string(),
            Self::TooManyRedirects => "Too many redirects".to_string(),
            Self::Aborted => "Navigation aborted".to_string(),
            Self::Http2Protocol => "HTTP/2 protocol error".to_string(),
            Self::ProxyAuthRequired => "Proxy authentication required".to_string(),
            Self::Unknown(raw) => raw.clone(),
        }
    }
}

/// A renderer engine that can launch instances
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launches a fresh renderer instance
    async fn launch(&self) -> Result<Arc<dyn RendererInstance>, RendererError>;
}

/// One live renderer instance hosting independent pages
#[async_trait]
pub trait RendererInstance: Send + Sync {
    /// Opens a new page (tab) on this instance
    async fn new_page(&self) -> Result<Box<dyn RendererPage>, RendererError>;

    /// Closes the instance and its process. Idempotent.
    async fn close(&self) -> Result<(), RendererError>;
}

/// A single page (tab) within a renderer instance
#[async_trait]
pub trait RendererPage: Send + Sync {
    /// Overrides the page's user agent before navigation
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), RendererError>;

    /// Navigates to a URL, waiting per `policy`, bounded by `timeout`
    async fn navigate(
        &mut self,
        url: &str,
        policy: WaitPolicy,
        timeout: Duration,
    ) -> Result<NavigationResponse, RendererError>;

    /// Returns the page's rendered HTML
    async fn content(&self) -> Result<String, RendererError>;

    /// Evaluates a script in the page context and returns its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RendererError>;

    /// Captures a screenshot of the page to `path`
    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<(), RendererError>;

    /// Captures a cropped screenshot of the first element matching
    /// `selector` to `path`
    async fn screenshot_element(&self, selector: &str, path: &Path)
        -> Result<(), RendererError>;

    /// Closes the page. Idempotent; closing a closed page is a no-op.
    async fn close(&mut self) -> Result<(), RendererError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dns_failure() {
        let kind = NavigationErrorKind::classify("net::ERR_NAME_NOT_RESOLVED at https://x.test");
        assert_eq!(kind, NavigationErrorKind::DnsFailure);
        assert!(kind.message().contains("not resolved"));
    }

    #[test]
    fn test_classify_connection_refused() {
        let kind = NavigationErrorKind::classify("net::ERR_CONNECTION_REFUSED");
        assert_eq!(kind, NavigationErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_classify_redirect_loop() {
        let kind = NavigationErrorKind::classify("net::ERR_TOO_MANY_REDIRECTS");
        assert_eq!(kind, NavigationErrorKind::TooManyRedirects);
    }

    #[test]
    fn test_classify_http2() {
        let kind = NavigationErrorKind::classify("net::ERR_HTTP2_PROTOCOL_ERROR");
        assert_eq!(kind, NavigationErrorKind::Http2Protocol);
    }

    #[test]
    fn test_classify_timeout_wording() {
        let kind = NavigationErrorKind::classify("Navigation timed out after 60000ms");
        assert_eq!(kind, NavigationErrorKind::Timeout);
    }

    #[test]
    fn test_classify_unknown_passes_through() {
        let kind = NavigationErrorKind::classify("something exotic happened");
        assert_eq!(
            kind.message(),
            "something exotic happened".to_string()
        );
    }
}
