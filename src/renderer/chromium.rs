//! Chromiumoxide-backed renderer adapter
//!
//! Drives a headless Chromium process over CDP. One [`ChromiumRenderer`]
//! launches any number of instances; each instance hosts independent pages.

use crate::config::RendererConfig;
use crate::renderer::{
    NavigationResponse, Renderer, RendererError, RendererInstance, RendererPage, WaitPolicy,
};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Probe for the main document's HTTP status. CDP does not hand the status
/// back on navigation, so we read it from the Performance API; pages where
/// the entry is missing (or reports 0) are treated as 200.
const STATUS_PROBE: &str = r#"
(() => {
    const entries = performance.getEntriesByType('navigation');
    if (entries.length > 0 && entries[0].responseStatus) {
        return entries[0].responseStatus;
    }
    return 0;
})()
"#;

/// Chromium renderer launcher
pub struct ChromiumRenderer {
    config: RendererConfig,
}

impl ChromiumRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self) -> Result<Arc<dyn RendererInstance>, RendererError> {
        let mut builder = BrowserConfig::builder();
        for arg in &self.config.launch_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder.build().map_err(RendererError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RendererError::Launch(e.to_string()))?;

        // Drive CDP events until the connection drops
        let events: JoinHandle<()> = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(ChromiumInstance {
            browser: Mutex::new(Some(browser)),
            events,
        }))
    }
}

/// One live Chromium process
struct ChromiumInstance {
    browser: Mutex<Option<Browser>>,
    events: JoinHandle<()>,
}

#[async_trait]
impl RendererInstance for ChromiumInstance {
    async fn new_page(&self) -> Result<Box<dyn RendererPage>, RendererError> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| RendererError::Page("instance already closed".to_string()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RendererError::Page(e.to_string()))?;

        Ok(Box::new(ChromiumPage { page: Some(page) }))
    }

    async fn close(&self) -> Result<(), RendererError> {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            browser
                .close()
                .await
                .map_err(|e| RendererError::Page(e.to_string()))?;
        }
        self.events.abort();
        Ok(())
    }
}

/// One Chromium tab
struct ChromiumPage {
    page: Option<Page>,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, RendererError> {
        self.page
            .as_ref()
            .ok_or_else(|| RendererError::Page("page already closed".to_string()))
    }
}

#[async_trait]
impl RendererPage for ChromiumPage {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), RendererError> {
        self.page()?
            .set_user_agent(user_agent)
            .await
            .map(|_| ())
            .map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn navigate(
        &mut self,
        url: &str,
        policy: WaitPolicy,
        timeout: Duration,
    ) -> Result<NavigationResponse, RendererError> {
        let page = self.page()?;

        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| RendererError::Navigation(e.to_string()))?;

            // Best-effort load wait; failure here means the page is still
            // usable, just possibly not settled.
            let _ = page.wait_for_navigation().await;

            if policy == WaitPolicy::NetworkIdle {
                // chromiumoxide has no first-class network-idle signal;
                // a short grace period approximates it.
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            let status = page
                .evaluate(STATUS_PROBE)
                .await
                .ok()
                .and_then(|v| v.into_value::<u16>().ok())
                .filter(|s| *s != 0)
                .unwrap_or(200);

            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());

            Ok(NavigationResponse { final_url, status })
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| RendererError::Timeout)?
    }

    async fn content(&self) -> Result<String, RendererError> {
        self.page()?
            .content()
            .await
            .map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RendererError> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| RendererError::Page(e.to_string()))?;

        result
            .into_value::<serde_json::Value>()
            .map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<(), RendererError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();

        self.page()?
            .save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn screenshot_element(
        &self,
        selector: &str,
        path: &Path,
    ) -> Result<(), RendererError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|e| RendererError::Page(e.to_string()))?;

        let bytes = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| RendererError::Page(e.to_string()))?;

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| RendererError::Page(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RendererError> {
        if let Some(page) = self.page.take() {
            page.close()
                .await
                .map_err(|e| RendererError::Page(e.to_string()))?;
        }
        Ok(())
    }
}
