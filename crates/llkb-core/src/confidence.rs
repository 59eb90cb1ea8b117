//! Confidence scoring for lessons and components.
//!
//! confidence = clamp(base × recency × sqrt(successRate) × reviewBoost, 0, 1)
//!
//! - base grows linearly with occurrences and saturates at 10.
//! - recency decays 0.3 over 90 days since the last success (floor 0.7), or
//!   0.5 over 30 days since creation when there was never a success
//!   (floor 0.5).
//! - human-reviewed entries get a 1.2× boost.

use crate::config::{ConfidenceConfig, LlkbConfig};
use crate::types::{push_confidence, Component, ConfidencePoint, Lesson};
use chrono::{DateTime, Utc};

const SATURATION_OCCURRENCES: f64 = 10.0;
const RECENCY_WINDOW_DAYS: f64 = 90.0;
const RECENCY_DECAY: f64 = 0.3;
const RECENCY_FLOOR: f64 = 0.7;
const UNPROVEN_WINDOW_DAYS: f64 = 30.0;
const UNPROVEN_DECAY: f64 = 0.5;
const UNPROVEN_FLOOR: f64 = 0.5;
const REVIEW_BOOST: f64 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceInputs {
    pub occurrences: u32,
    pub success_rate: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub human_reviewed: bool,
}

impl From<&Lesson> for ConfidenceInputs {
    fn from(lesson: &Lesson) -> Self {
        Self {
            occurrences: lesson.metrics.occurrences,
            success_rate: lesson.metrics.success_rate,
            last_success: lesson.metrics.last_success,
            created_at: lesson.metrics.first_seen,
            human_reviewed: lesson.validation.human_reviewed,
        }
    }
}

impl From<&Component> for ConfidenceInputs {
    fn from(component: &Component) -> Self {
        Self {
            occurrences: component.metrics.total_uses,
            success_rate: component.metrics.success_rate,
            last_success: component.metrics.last_success,
            created_at: component.metrics.created_at,
            human_reviewed: false,
        }
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_seconds() as f64 / 86_400.0).max(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn calculate_confidence(inputs: &ConfidenceInputs, now: DateTime<Utc>) -> f64 {
    let base = (f64::from(inputs.occurrences) / SATURATION_OCCURRENCES).min(1.0);

    let recency = match inputs.last_success {
        Some(ts) => {
            let days = days_between(ts, now);
            (1.0 - days / RECENCY_WINDOW_DAYS * RECENCY_DECAY).max(RECENCY_FLOOR)
        }
        None => {
            let days = days_between(inputs.created_at, now);
            (1.0 - days / UNPROVEN_WINDOW_DAYS * UNPROVEN_DECAY).max(UNPROVEN_FLOOR)
        }
    };

    let success_factor = inputs.success_rate.clamp(0.0, 1.0).sqrt();
    let boost = if inputs.human_reviewed {
        REVIEW_BOOST
    } else {
        1.0
    };

    round2((base * recency * success_factor * boost).clamp(0.0, 1.0))
}

/// True when `current` sits more than `declining_drop` below the mean of the
/// trailing `history_window` samples.
pub fn detect_declining_confidence(
    current: f64,
    history: &[ConfidencePoint],
    cfg: &ConfidenceConfig,
) -> bool {
    if cfg.history_window == 0 {
        return false;
    }
    let start = history.len().saturating_sub(cfg.history_window);
    let window = &history[start..];
    if window.len() < 2 {
        return false;
    }
    let mean = window.iter().map(|p| p.value).sum::<f64>() / window.len() as f64;
    current < mean * (1.0 - cfg.declining_drop)
}

/// Confidence as of `now`. The stored value only moves when the lesson is
/// mutated, so readers that rank or filter use this instead.
pub fn lesson_confidence(lesson: &Lesson, now: DateTime<Utc>) -> f64 {
    calculate_confidence(&ConfidenceInputs::from(lesson), now)
}

pub fn component_confidence(component: &Component, now: DateTime<Utc>) -> f64 {
    calculate_confidence(&ConfidenceInputs::from(component), now)
}

/// The last history entry is the stored confidence itself, so it is left out
/// of the trailing mean.
pub fn lesson_is_declining(lesson: &Lesson, cfg: &ConfidenceConfig) -> bool {
    let history = &lesson.metrics.confidence_history;
    let earlier = history.split_last().map_or(&history[..], |(_, rest)| rest);
    detect_declining_confidence(lesson.metrics.confidence, earlier, cfg)
}

/// Component used fewer than `minUsesToKeep` times after `archiveUnused` days.
pub fn component_underused(component: &Component, config: &LlkbConfig, now: DateTime<Utc>) -> bool {
    let age_days = days_between(component.metrics.created_at, now);
    component.metrics.total_uses < config.retention.min_uses_to_keep
        && age_days > config.retention.archive_unused as f64
}

pub fn needs_review_lesson(lesson: &Lesson, config: &LlkbConfig, now: DateTime<Utc>) -> bool {
    lesson_confidence(lesson, now) < config.confidence.review_threshold
        || lesson_is_declining(lesson, &config.confidence)
        || lesson.metrics.flagged_for_review
}

pub fn needs_review_component(
    component: &Component,
    config: &LlkbConfig,
    now: DateTime<Utc>,
) -> bool {
    component_confidence(component, now) < config.confidence.review_threshold
        || component.metrics.flagged_for_review
        || component_underused(component, config, now)
}

/// Recompute a lesson's confidence and append it to its history.
pub fn refresh_lesson(lesson: &mut Lesson, now: DateTime<Utc>) -> f64 {
    let confidence = lesson_confidence(lesson, now);
    lesson.metrics.confidence = confidence;
    push_confidence(&mut lesson.metrics.confidence_history, now, confidence);
    confidence
}

/// Recompute a component's confidence and append it to its history.
pub fn refresh_component(component: &mut Component, now: DateTime<Utc>) -> f64 {
    let confidence = component_confidence(component, now);
    component.metrics.confidence = confidence;
    push_confidence(&mut component.metrics.confidence_history, now, confidence);
    confidence
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
