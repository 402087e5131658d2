//! Accessibility auditing
//!
//! This module runs a third-party WCAG rule engine against a rendered page
//! and post-processes its findings:
//! - `snapshot.rs` builds a self-contained offline copy of the page so the
//!   analysis is reproducible and isolated from the live site
//! - `auditor.rs` loads the snapshot in a dedicated renderer instance,
//!   injects the rule engine, and runs the curated rule set
//! - this file holds the report model and conformance-level filtering

mod auditor;
mod snapshot;

pub use auditor::AccessibilityAuditor;

use serde::{Deserialize, Serialize};

/// Which WCAG conformance levels a request enabled
///
/// Each level is independently selectable; enabling AA does not imply A.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConformanceLevels {
    #[serde(default, rename = "A")]
    pub a: bool,
    #[serde(default, rename = "AA")]
    pub aa: bool,
    #[serde(default, rename = "AAA")]
    pub aaa: bool,
}

impl ConformanceLevels {
    pub fn any(&self) -> bool {
        self.a || self.aa || self.aaa
    }
}

/// Full audit output for one page
///
/// The four outcome lists mirror the rule engine's result buckets. `error`
/// is set when the audit itself failed; the lists are then empty and the
/// page result still counts as fetched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessibilityReport {
    pub violations: Vec<RuleOutcome>,
    pub passes: Vec<RuleOutcome>,
    pub incomplete: Vec<RuleOutcome>,
    pub inapplicable: Vec<RuleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessibilityReport {
    /// Report carrying only an audit-level error
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One rule's outcome as reported by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub help_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<ElementInstance>,
}

/// One affected element within a rule outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInstance {
    /// Serialized markup snippet of the element
    #[serde(default)]
    pub html: String,

    /// Selector path identifying the element
    #[serde(default)]
    pub target: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,

    /// Cropped screenshot of the element, when capture succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    A,
    Aa,
    Aaa,
}

/// Maps a rule tag to the conformance level it asserts, if any
///
/// Conformance tags follow the `wcag2a` / `wcag21aa` / `wcag22aaa` shape:
/// a `wcag2` prefix, an optional minor version digit, then the level.
/// Everything else (`cat.*`, `best-practice`, `ACT`, ...) is not a
/// conformance tag.
fn tag_level(tag: &str) -> Option<Level> {
    let rest = tag.strip_prefix("wcag2")?;
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    match rest {
        "a" => Some(Level::A),
        "aa" => Some(Level::Aa),
        "aaa" => Some(Level::Aaa),
        _ => None,
    }
}

/// Whether an outcome survives conformance filtering
///
/// An outcome is retained if it carries no conformance tag at all, or if at
/// least one of its tags matches an enabled level.
fn retained(outcome: &RuleOutcome, levels: ConformanceLevels) -> bool {
    let mut saw_conformance_tag = false;

    for tag in &outcome.tags {
        match tag_level(tag) {
            Some(Level::A) if levels.a => return true,
            Some(Level::Aa) if levels.aa => return true,
            Some(Level::Aaa) if levels.aaa => return true,
            Some(_) => saw_conformance_tag = true,
            None => {}
        }
    }

    !saw_conformance_tag
}

/// Filters every outcome list of a report down to the enabled levels
pub(crate) fn filter_report(
    mut report: AccessibilityReport,
    levels: ConformanceLevels,
) -> AccessibilityReport {
    report.violations.retain(|o| retained(o, levels));
    report.passes.retain(|o| retained(o, levels));
    report.incomplete.retain(|o| retained(o, levels));
    report.inapplicable.retain(|o| retained(o, levels));
    report
}
