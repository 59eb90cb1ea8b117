//! Gatekeeping for predictive component extraction.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. feature enabled
//! 2. per-run cap
//! 3. per-day cap (today's `component_extracted` events)
//! 4. total component soft cap (warning only)
//! 5. near-duplicate of an existing component
//! 6. minimum snippet size

use crate::config::ExtractionConfig;
use crate::history::{EventKind, HistoryLog};
use crate::similarity;
use crate::types::{Component, ExtractionCandidate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Per-run state owned by the caller. One value per tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub run_id: String,
    pub tool: String,
    predictive_extractions: u32,
}

impl RunContext {
    /// New run with a generated id.
    pub fn new(tool: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), tool)
    }

    pub fn with_id(run_id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            tool: tool.into(),
            predictive_extractions: 0,
        }
    }

    pub fn predictive_extractions(&self) -> u32 {
        self.predictive_extractions
    }

    pub fn record_predictive_extraction(&mut self) {
        self.predictive_extractions += 1;
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeferReason {
    Disabled,
    RunLimit { used: u32, limit: u32 },
    DailyLimit { used: usize, limit: u32 },
    NearDuplicate { existing_id: String, similarity: f64 },
    TooSmall { lines: usize, min: usize },
}

impl DeferReason {
    /// Budget-based refusals; the candidate is worth another look later.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, DeferReason::RunLimit { .. } | DeferReason::DailyLimit { .. })
    }
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::Disabled => write!(f, "disabled in config"),
            DeferReason::RunLimit { used, limit } => {
                write!(f, "journey limit reached ({used}/{limit})")
            }
            DeferReason::DailyLimit { used, limit } => {
                write!(f, "daily limit reached ({used}/{limit})")
            }
            DeferReason::NearDuplicate {
                existing_id,
                similarity,
            } => write!(
                f,
                "near-duplicate of {existing_id} (similarity {similarity:.2})"
            ),
            DeferReason::TooSmall { lines, min } => {
                write!(f, "too small ({lines} lines, minimum {min})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDecision {
    pub extract: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<DeferReason>,
    /// Existing component to reuse instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExtractionDecision {
    fn approve(warnings: Vec<String>) -> Self {
        Self {
            extract: true,
            reason: "all checks passed".to_string(),
            blocked_by: None,
            suggestion: None,
            warnings,
        }
    }

    fn block(reason: DeferReason, warnings: Vec<String>) -> Self {
        let suggestion = match &reason {
            DeferReason::NearDuplicate { existing_id, .. } => Some(existing_id.clone()),
            _ => None,
        };
        Self {
            extract: false,
            reason: reason.to_string(),
            blocked_by: Some(reason),
            suggestion,
            warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

pub fn should_extract_predictively(
    candidate: &ExtractionCandidate,
    components: &[Component],
    history: &HistoryLog,
    config: &ExtractionConfig,
    run: &RunContext,
) -> ExtractionDecision {
    let mut warnings = Vec::new();

    if !config.predictive_extraction {
        return ExtractionDecision::block(DeferReason::Disabled, warnings);
    }

    if run.predictive_extractions >= config.max_predictive_per_journey {
        return ExtractionDecision::block(
            DeferReason::RunLimit {
                used: run.predictive_extractions,
                limit: config.max_predictive_per_journey,
            },
            warnings,
        );
    }

    let today = history.count_events_today(|e| {
        matches!(
            e.kind,
            EventKind::ComponentExtracted {
                predictive: true,
                ..
            }
        )
    });
    if today >= config.max_predictive_per_day as usize {
        return ExtractionDecision::block(
            DeferReason::DailyLimit {
                used: today,
                limit: config.max_predictive_per_day,
            },
            warnings,
        );
    }

    if components.len() >= config.max_total_components {
        warnings.push(format!(
            "component count {} has reached the soft cap of {}",
            components.len(),
            config.max_total_components
        ));
    }

    let existing = components
        .iter()
        .map(|c| (c.id.as_str(), c.source.original_code.as_str()));
    if let Some(best) =
        similarity::find_near_duplicates(&candidate.code, existing, config.similarity_threshold)
            .into_iter()
            .next()
    {
        return ExtractionDecision::block(
            DeferReason::NearDuplicate {
                existing_id: best.id,
                similarity: best.similarity,
            },
            warnings,
        );
    }

    let lines = candidate
        .code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count();
    if lines < config.min_lines_for_extraction {
        return ExtractionDecision::block(
            DeferReason::TooSmall {
                lines,
                min: config.min_lines_for_extraction,
            },
            warnings,
        );
    }

    tracing::debug!(candidate = %candidate.name, "predictive extraction approved");
    ExtractionDecision::approve(warnings)
}

// ---------------------------------------------------------------------------
// Extraction score tiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    AutoExtract,
    Consider,
    Skip,
}

/// Map a duplication score onto the configured extraction tiers.
pub fn classify_score(score: u32, config: &ExtractionConfig) -> ExtractionTier {
    if score >= config.auto_extract_score {
        ExtractionTier::AutoExtract
    } else if score >= config.consider_score {
        ExtractionTier::Consider
    } else {
        ExtractionTier::Skip
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
