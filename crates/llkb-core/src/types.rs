//! Domain types persisted in the knowledge base.
//!
//! Every collection serializes with camelCase keys so the files stay
//! readable by the tooling that consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence history entries kept per entity.
pub const MAX_CONFIDENCE_HISTORY: usize = 100;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonCategory {
    Selector,
    Timing,
    Quirk,
    Auth,
    Data,
    Assertion,
    Navigation,
}

impl LessonCategory {
    pub fn all() -> &'static [LessonCategory] {
        &[
            LessonCategory::Selector,
            LessonCategory::Timing,
            LessonCategory::Quirk,
            LessonCategory::Auth,
            LessonCategory::Data,
            LessonCategory::Assertion,
            LessonCategory::Navigation,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LessonCategory::Selector => "selector",
            LessonCategory::Timing => "timing",
            LessonCategory::Quirk => "quirk",
            LessonCategory::Auth => "auth",
            LessonCategory::Data => "data",
            LessonCategory::Assertion => "assertion",
            LessonCategory::Navigation => "navigation",
        }
    }
}

impl fmt::Display for LessonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LessonCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown lesson category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Selector,
    Timing,
    Auth,
    Data,
    Assertion,
    Navigation,
    Ui,
}

impl ComponentCategory {
    pub fn all() -> &'static [ComponentCategory] {
        &[
            ComponentCategory::Selector,
            ComponentCategory::Timing,
            ComponentCategory::Auth,
            ComponentCategory::Data,
            ComponentCategory::Assertion,
            ComponentCategory::Navigation,
            ComponentCategory::Ui,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentCategory::Selector => "selector",
            ComponentCategory::Timing => "timing",
            ComponentCategory::Auth => "auth",
            ComponentCategory::Data => "data",
            ComponentCategory::Assertion => "assertion",
            ComponentCategory::Navigation => "navigation",
            ComponentCategory::Ui => "ui",
        }
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown component category '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Universal,
    FrameworkSpecific,
    #[default]
    AppSpecific,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Universal => "universal",
            Scope::FrameworkSpecific => "framework-specific",
            Scope::AppSpecific => "app-specific",
        }
    }
}

// ---------------------------------------------------------------------------
// Shared metric pieces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Append a confidence sample, dropping the oldest beyond the cap.
pub fn push_confidence(history: &mut Vec<ConfidencePoint>, timestamp: DateTime<Utc>, value: f64) {
    history.push(ConfidencePoint { timestamp, value });
    if history.len() > MAX_CONFIDENCE_HISTORY {
        let excess = history.len() - MAX_CONFIDENCE_HISTORY;
        history.drain(..excess);
    }
}

/// Running success rate after one more observation.
pub fn updated_success_rate(successes: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(successes) / f64::from(total)
    }
}

// ---------------------------------------------------------------------------
// Lesson
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePattern {
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

impl CodePattern {
    /// Text used for near-duplicate matching.
    pub fn fingerprint(&self) -> String {
        match (self.before.trim().is_empty(), self.after.trim().is_empty()) {
            (true, _) => self.after.clone(),
            (_, true) => self.before.clone(),
            _ => format!("{}\n{}", self.before, self.after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonMetrics {
    pub occurrences: u32,
    #[serde(default)]
    pub successes: u32,
    pub success_rate: f64,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_history: Vec<ConfidencePoint>,
    pub first_seen: DateTime<Utc>,
    #[serde(default)]
    pub last_applied: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overrides: u32,
    #[serde(default)]
    pub flagged_for_review: bool,
}

impl LessonMetrics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            occurrences: 0,
            successes: 0,
            success_rate: 0.0,
            confidence: 0.0,
            confidence_history: Vec::new(),
            first_seen: now,
            last_applied: None,
            last_success: None,
            overrides: 0,
            flagged_for_review: false,
        }
    }

    /// Count one more application of the lesson.
    pub fn record_outcome(&mut self, success: bool, now: DateTime<Utc>) {
        self.occurrences += 1;
        if success {
            self.successes += 1;
            self.last_success = Some(now);
        }
        self.success_rate = updated_success_rate(self.successes, self.occurrences);
        self.last_applied = Some(now);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSource {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    #[serde(default)]
    pub auto_validated: bool,
    #[serde(default)]
    pub human_reviewed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub category: LessonCategory,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub scope: Scope,
    pub problem: String,
    pub solution: String,
    #[serde(default)]
    pub code_pattern: CodePattern,
    #[serde(default)]
    pub applicable_to: Vec<String>,
    pub metrics: LessonMetrics,
    #[serde(default)]
    pub source: LessonSource,
    #[serde(default)]
    pub validation: Validation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRule {
    pub id: String,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

// ---------------------------------------------------------------------------
// AppQuirk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppQuirk {
    pub id: String,
    pub component: String,
    pub description: String,
    #[serde(default)]
    pub impact: String,
    pub workaround: String,
    #[serde(default)]
    pub permanent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_link: Option<String>,
    #[serde(default)]
    pub affected_runs: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetrics {
    #[serde(default)]
    pub used_in: Vec<String>,
    pub total_uses: u32,
    #[serde(default)]
    pub successes: u32,
    pub success_rate: f64,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_history: Vec<ConfidencePoint>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overrides: u32,
    #[serde(default)]
    pub flagged_for_review: bool,
}

impl ComponentMetrics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            used_in: Vec::new(),
            total_uses: 0,
            successes: 0,
            success_rate: 0.0,
            confidence: 0.0,
            confidence_history: Vec::new(),
            created_at: now,
            last_used: None,
            last_success: None,
            overrides: 0,
            flagged_for_review: false,
        }
    }

    /// Count one more use of the component at `location`.
    pub fn record_use(&mut self, location: &str, success: bool, now: DateTime<Utc>) {
        self.total_uses += 1;
        if success {
            self.successes += 1;
            self.last_success = Some(now);
        }
        self.success_rate = updated_success_rate(self.successes, self.total_uses);
        self.last_used = Some(now);
        if !location.is_empty() && !self.used_in.iter().any(|l| l == location) {
            self.used_in.push(location.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSource {
    pub original_code: String,
    #[serde(default)]
    pub extracted_from: String,
    #[serde(default)]
    pub extracted_by: String,
    #[serde(default)]
    pub predictive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    pub category: ComponentCategory,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub import_path: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub metrics: ComponentMetrics,
    pub source: ComponentSource,
    #[serde(default)]
    pub related_lessons: Vec<String>,
    #[serde(default)]
    pub related_components: Vec<String>,
}

/// A reusable-code candidate offered for extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionCandidate {
    pub name: String,
    pub category: ComponentCategory,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub description: String,
    pub code: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub import_path: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub related_lessons: Vec<String>,
}

/// A candidate held back by the rate limiter for a later pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredCandidate {
    pub candidate: ExtractionCandidate,
    pub reason: String,
    pub deferred_at: DateTime<Utc>,
    pub run_id: String,
}

// ---------------------------------------------------------------------------
// Entity references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Lesson,
    Component,
}

impl EntityKind {
    /// Classify an id by its prefix (`COMP…` or `L…`).
    pub fn of(id: &str) -> Option<Self> {
        if id.starts_with("COMP") {
            Some(EntityKind::Component)
        } else if id.starts_with('L') {
            Some(EntityKind::Lesson)
        } else {
            None
        }
    }
}

/// Next sequential id with `prefix`, using the highest numeric suffix + 1 so
/// archiving never recycles an id still referenced from history.
pub fn next_id<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let max = existing
        .filter_map(|id| id.strip_prefix(prefix)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", max + 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
