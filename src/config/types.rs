use crate::renderer::WaitPolicy;
use serde::Deserialize;

/// Main configuration structure for Sitelens
///
/// Every section has defaults, so the server can start without a config
/// file and a file only needs to name the knobs it changes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub crawler: CrawlerConfig,
    pub renderer: RendererConfig,
    pub audit: AuditConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the streaming endpoint binds to
    #[serde(rename = "bind-address")]
    pub bind_address: String,

    /// Directory where page screenshots are written
    #[serde(rename = "screenshot-dir")]
    pub screenshot_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3001".to_string(),
            screenshot_dir: "./screenshots".to_string(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Base per-navigation timeout in seconds (doubled when the request
    /// sets `increaseTimeout`)
    #[serde(rename = "navigation-timeout-secs")]
    pub navigation_timeout_secs: u64,

    /// Upper bound on one whole wave of concurrent fetches, in seconds
    #[serde(rename = "batch-timeout-secs")]
    pub batch_timeout_secs: u64,

    /// Post-load settle delay for dynamic content, in milliseconds
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    /// Delay inserted between waves when the request sets `slowRateLimit`,
    /// in milliseconds
    #[serde(rename = "wave-delay-ms")]
    pub wave_delay_ms: u64,

    /// Navigation completion condition. `dom-content-loaded` (the default)
    /// finishes faster and tolerates pages holding long-lived connections
    /// open, at the cost of possibly missing late-loading dynamic content;
    /// `network-idle` waits for the network to quiesce.
    #[serde(rename = "wait-policy")]
    pub wait_policy: WaitPolicy,

    /// Hosts that are rejected without attempting navigation
    #[serde(rename = "blocked-hosts")]
    pub blocked_hosts: Vec<String>,

    /// CSS selectors whose presence in a rendered page marks it as an
    /// anti-bot challenge. Tunable because real-world challenge pages vary.
    #[serde(rename = "challenge-selectors")]
    pub challenge_selectors: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 60,
            batch_timeout_secs: 300,
            settle_delay_ms: 2000,
            wave_delay_ms: 5000,
            wait_policy: WaitPolicy::DomContentLoaded,
            blocked_hosts: vec![
                "linkedin.com".to_string(),
                "www.linkedin.com".to_string(),
                "facebook.com".to_string(),
                "www.facebook.com".to_string(),
                "instagram.com".to_string(),
                "www.instagram.com".to_string(),
            ],
            challenge_selectors: vec![
                "#captcha".to_string(),
                "#challenge-form".to_string(),
                "#challenge-running".to_string(),
                ".g-recaptcha".to_string(),
                ".h-captcha".to_string(),
                "[data-sitekey]".to_string(),
                "#cf-challenge-running".to_string(),
            ],
        }
    }
}

/// Renderer pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Maximum number of live renderer instances in the pool
    #[serde(rename = "pool-size")]
    pub pool_size: usize,

    /// Extra arguments passed to the browser process
    #[serde(rename = "launch-args")]
    pub launch_args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            launch_args: vec![
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
        }
    }
}

/// Accessibility audit configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Path to the rule-engine script injected into audited pages
    #[serde(rename = "rule-script-path")]
    pub rule_script_path: String,

    /// Name of the global object the rule engine installs
    #[serde(rename = "engine-global")]
    pub engine_global: String,

    /// Curated rule subset to run (deliberately narrower than the engine's
    /// full catalog)
    pub rules: Vec<String>,

    /// Hard timeout for one audit attempt, in seconds
    #[serde(rename = "attempt-timeout-secs")]
    pub attempt_timeout_secs: u64,

    /// Number of audit attempts before surfacing a report-level error
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// URL substrings never mirrored into the offline snapshot
    #[serde(rename = "resource-denylist")]
    pub resource_denylist: Vec<String>,

    /// Directory where offline snapshots are staged; the system temp
    /// directory when unset
    #[serde(rename = "snapshot-dir")]
    pub snapshot_dir: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            rule_script_path: "./assets/axe.min.js".to_string(),
            engine_global: "axe".to_string(),
            rules: vec![
                "color-contrast".to_string(),
                "document-title".to_string(),
                "html-has-lang".to_string(),
                "image-alt".to_string(),
                "link-name".to_string(),
                "meta-viewport".to_string(),
            ],
            attempt_timeout_secs: 30,
            max_attempts: 3,
            resource_denylist: vec![
                "gstatic.com/recaptcha".to_string(),
                "googletagmanager.com".to_string(),
                "doubleclick.net".to_string(),
            ],
            snapshot_dir: None,
        }
    }
}
