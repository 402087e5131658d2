//! Scripted renderer for the test suite
//!
//! Plays back canned pages, statuses, and navigation failures so the whole
//! crawl pipeline can be exercised without a browser process.

use crate::renderer::{
    NavigationResponse, Renderer, RendererError, RendererInstance, RendererPage, WaitPolicy,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted navigation target
#[derive(Debug, Clone)]
enum ScriptedPage {
    Ok { status: u16, html: String },
    NavError(String),
}

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<String, ScriptedPage>>,
    audit_results: Mutex<serde_json::Value>,
    launches: AtomicUsize,
    live: AtomicUsize,
    close_delay: Mutex<Duration>,
    nav_delays: Mutex<HashMap<String, Duration>>,
    navigations: Mutex<Vec<String>>,
}

/// Scripted stand-in for a browser engine
///
/// Unknown URLs answer 404 with an empty body, so tests only script what
/// they care about.
#[derive(Clone, Default)]
pub struct MockRenderer {
    inner: Arc<Inner>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a 200 response with the given HTML body
    pub fn script_page(&self, url: &str, html: &str) {
        self.script_status(url, 200, html);
    }

    /// Scripts a response with an explicit status
    pub fn script_status(&self, url: &str, status: u16, html: &str) {
        self.inner.pages.lock().unwrap().insert(
            url.to_string(),
            ScriptedPage::Ok {
                status,
                html: html.to_string(),
            },
        );
    }

    /// Scripts a navigation failure with raw engine error text
    pub fn script_nav_error(&self, url: &str, raw: &str) {
        self.inner
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), ScriptedPage::NavError(raw.to_string()));
    }

    /// Sets the JSON the rule engine "returns" when an audit runs
    pub fn set_audit_results(&self, results: serde_json::Value) {
        *self.inner.audit_results.lock().unwrap() = results;
    }

    /// Delays instance close, widening the pool-drain window for tests
    pub fn set_close_delay(&self, delay: Duration) {
        *self.inner.close_delay.lock().unwrap() = delay;
    }

    /// Delays navigation to one URL, simulating a slow page
    pub fn set_nav_delay(&self, url: &str, delay: Duration) {
        self.inner
            .nav_delays
            .lock()
            .unwrap()
            .insert(url.to_string(), delay);
    }

    /// Number of instances ever launched
    pub fn launch_count(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Number of instances currently open
    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn launch(&self) -> Result<Arc<dyn RendererInstance>, RendererError> {
        self.inner.launches.fetch_add(1, Ordering::SeqCst);
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockInstance {
            inner: Arc::clone(&self.inner),
            closed: Mutex::new(false),
        }))
    }
}

struct MockInstance {
    inner: Arc<Inner>,
    closed: Mutex<bool>,
}

#[async_trait]
impl RendererInstance for MockInstance {
    async fn new_page(&self) -> Result<Box<dyn RendererPage>, RendererError> {
        if *self.closed.lock().unwrap() {
            return Err(RendererError::Page("instance already closed".to_string()));
        }
        Ok(Box::new(MockPage {
            inner: Arc::clone(&self.inner),
            html: String::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), RendererError> {
        let delay = *self.inner.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.inner.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MockPage {
    inner: Arc<Inner>,
    html: String,
    closed: bool,
}

#[async_trait]
impl RendererPage for MockPage {
    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<(), RendererError> {
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        _policy: WaitPolicy,
        _timeout: Duration,
    ) -> Result<NavigationResponse, RendererError> {
        if self.closed {
            return Err(RendererError::Page("page already closed".to_string()));
        }

        self.inner
            .navigations
            .lock()
            .unwrap()
            .push(url.to_string());

        let delay = self.inner.nav_delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Snapshot documents load straight from disk
        if let Some(path) = url.strip_prefix("file://") {
            self.html = std::fs::read_to_string(path).unwrap_or_default();
            return Ok(NavigationResponse {
                final_url: url.to_string(),
                status: 200,
            });
        }

        let scripted = self.inner.pages.lock().unwrap().get(url).cloned();
        match scripted {
            Some(ScriptedPage::Ok { status, html }) => {
                self.html = html;
                Ok(NavigationResponse {
                    final_url: url.to_string(),
                    status,
                })
            }
            Some(ScriptedPage::NavError(raw)) => Err(RendererError::Navigation(raw)),
            None => {
                self.html.clear();
                Ok(NavigationResponse {
                    final_url: url.to_string(),
                    status: 404,
                })
            }
        }
    }

    async fn content(&self) -> Result<String, RendererError> {
        Ok(self.html.clone())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RendererError> {
        if script.contains("document.readyState") {
            return Ok(serde_json::Value::String("complete".to_string()));
        }
        // Rule-engine availability probe
        if script.contains("typeof window.") {
            return Ok(serde_json::Value::Bool(true));
        }
        // Rule-engine run call
        if script.contains(".run(") {
            return Ok(self.inner.audit_results.lock().unwrap().clone());
        }
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> Result<(), RendererError> {
        std::fs::write(path, b"png").map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn screenshot_element(
        &self,
        _selector: &str,
        path: &Path,
    ) -> Result<(), RendererError> {
        std::fs::write(path, b"png").map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RendererError> {
        self.closed = true;
        Ok(())
    }
}
