//! Audit execution against offline snapshots

use super::snapshot::{self, Snapshot, SnapshotError};
use super::{filter_report, AccessibilityReport, ConformanceLevels};
use crate::config::AuditConfig;
use crate::renderer::{Renderer, RendererError, RendererInstance, WaitPolicy};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Delay between failed attempts; transient snapshot and renderer failures
/// often clear within it
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0}")]
    Renderer(#[from] RendererError),

    #[error("{0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Analysis timed out")]
    Timeout,

    #[error("Rule engine did not become available in the page")]
    EngineUnavailable,

    #[error("Rule engine returned malformed results: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raw engine output before conformance filtering
#[derive(Debug, serde::Deserialize)]
struct RawReport {
    #[serde(default)]
    violations: Vec<super::RuleOutcome>,
    #[serde(default)]
    passes: Vec<super::RuleOutcome>,
    #[serde(default)]
    incomplete: Vec<super::RuleOutcome>,
    #[serde(default)]
    inapplicable: Vec<super::RuleOutcome>,
}

/// Runs the WCAG rule engine against offline page snapshots
///
/// Each audit launches its own renderer instance rather than borrowing a
/// pooled one, so a wedged analysis can never poison a crawl's shared
/// instances. Attempts are retried up to the configured bound; exhaustion
/// surfaces as a report-level error while the page fetch itself succeeds.
pub struct AccessibilityAuditor {
    config: AuditConfig,
    renderer: Arc<dyn Renderer>,
    http: reqwest::Client,
    engine_source: OnceCell<String>,
}

impl AccessibilityAuditor {
    pub fn new(config: AuditConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            config,
            renderer,
            http: reqwest::Client::new(),
            engine_source: OnceCell::new(),
        }
    }

    /// Audits one rendered page; never fails the caller
    pub async fn audit(
        &self,
        page_url: &url::Url,
        html: &str,
        levels: ConformanceLevels,
        screenshot_dir: &Path,
    ) -> AccessibilityReport {
        let engine_source = match self
            .engine_source
            .get_or_try_init(|| tokio::fs::read_to_string(&self.config.rule_script_path))
            .await
        {
            Ok(source) => source,
            Err(e) => {
                return AccessibilityReport::failed(format!(
                    "Rule engine script unavailable ({}): {}",
                    self.config.rule_script_path, e
                ))
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(RETRY_DELAY).await;
            }
            match self
                .run_attempt(html, engine_source, levels, page_url, screenshot_dir)
                .await
            {
                Ok(report) => return report,
                Err(e) => {
                    tracing::warn!(
                        "Audit attempt {}/{} for {} failed: {}",
                        attempt,
                        self.config.max_attempts,
                        page_url,
                        e
                    );
                    last_error = e.to_string();
                }
            }
        }

        AccessibilityReport::failed(format!(
            "Accessibility analysis failed after {} attempts: {}",
            self.config.max_attempts, last_error
        ))
    }

    /// One self-contained attempt: fresh snapshot, fresh renderer instance,
    /// both torn down before returning
    async fn run_attempt(
        &self,
        html: &str,
        engine_source: &str,
        levels: ConformanceLevels,
        page_url: &url::Url,
        screenshot_dir: &Path,
    ) -> Result<AccessibilityReport, AttemptError> {
        let snapshot = snapshot::build_snapshot(
            html,
            page_url,
            &self.config.resource_denylist,
            self.config.snapshot_dir.as_deref().map(Path::new),
            &self.http,
        )
        .await?;

        let instance = self.renderer.launch().await?;

        let work = self.run_on_instance(
            instance.as_ref(),
            &snapshot,
            engine_source,
            levels,
            page_url,
            screenshot_dir,
        );
        let timeout = Duration::from_secs(self.config.attempt_timeout_secs);
        let outcome = tokio::time::timeout(timeout, work).await;

        if let Err(e) = instance.close().await {
            tracing::debug!("Failed to close audit instance: {}", e);
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout),
        }
    }

    async fn run_on_instance(
        &self,
        instance: &dyn RendererInstance,
        snapshot: &Snapshot,
        engine_source: &str,
        levels: ConformanceLevels,
        page_url: &url::Url,
        screenshot_dir: &Path,
    ) -> Result<AccessibilityReport, AttemptError> {
        let mut page = instance.new_page().await?;

        let timeout = Duration::from_secs(self.config.attempt_timeout_secs);
        page.navigate(&snapshot.index_url(), WaitPolicy::DomContentLoaded, timeout)
            .await?;

        // Best-effort readiness wait; the snapshot is local, so this
        // settles almost immediately in practice
        for _ in 0..20 {
            match page.evaluate("document.readyState").await {
                Ok(value) if value == serde_json::json!("complete") => break,
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }

        page.evaluate(engine_source).await?;

        let probe = format!(
            "typeof window.{} !== 'undefined'",
            self.config.engine_global
        );
        let mut engine_ready = false;
        for _ in 0..10 {
            if page.evaluate(&probe).await? == serde_json::json!(true) {
                engine_ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if !engine_ready {
            let _ = page.close().await;
            return Err(AttemptError::EngineUnavailable);
        }

        let raw_value = page.evaluate(&self.run_script()).await?;
        let raw: RawReport = serde_json::from_value(raw_value)?;

        let mut report = filter_report(
            AccessibilityReport {
                violations: raw.violations,
                passes: raw.passes,
                incomplete: raw.incomplete,
                inapplicable: raw.inapplicable,
                error: None,
            },
            levels,
        );

        self.capture_violation_elements(page.as_mut(), &mut report, page_url, screenshot_dir)
            .await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close audit page: {}", e);
        }

        Ok(report)
    }

    /// Builds the in-page call running the curated rule subset
    fn run_script(&self) -> String {
        let rules = serde_json::to_string(&self.config.rules)
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            "(async () => {{ const results = await window.{}.run(document, \
             {{ runOnly: {{ type: 'rule', values: {} }} }}); \
             return JSON.parse(JSON.stringify(results)); }})()",
            self.config.engine_global, rules
        )
    }

    /// Captures cropped screenshots of violating elements, best-effort
    ///
    /// A missing or failed capture never fails the violation record.
    async fn capture_violation_elements(
        &self,
        page: &mut dyn crate::renderer::RendererPage,
        report: &mut AccessibilityReport,
        page_url: &url::Url,
        screenshot_dir: &Path,
    ) {
        let url_hash = hex::encode(&Sha256::digest(page_url.as_str().as_bytes())[..6]);

        for (rule_index, violation) in report.violations.iter_mut().enumerate() {
            for (node_index, node) in violation.nodes.iter_mut().enumerate() {
                let Some(selector) = node.target.first() else {
                    continue;
                };

                let filename =
                    format!("violation_{}_{}_{}.png", url_hash, rule_index, node_index);
                let path = screenshot_dir.join(&filename);

                match page.screenshot_element(selector, &path).await {
                    Ok(()) => node.screenshot = Some(filename),
                    Err(e) => {
                        tracing::debug!(
                            "Element screenshot failed for {} ({}): {}",
                            violation.id,
                            selector,
                            e
                        );
                    }
                }
            }
        }
    }
}
