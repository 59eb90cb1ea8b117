//! Derived summary statistics (`analytics.json`).
//!
//! The snapshot is never patched in place: [`recompute`] rebuilds it from
//! the lesson and component collections every time. Confidence figures are
//! computed as of the recompute time, not read from the stored metrics.

use crate::confidence;
use crate::config::LlkbConfig;
use crate::error::Result;
use crate::paths;
use crate::store::{Collection, ComponentsFile, LessonsFile, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TOP_N: usize = 5;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_lessons: usize,
    pub total_components: usize,
    pub total_quirks: usize,
    pub global_rules: usize,
    pub deferred_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStats {
    pub by_category: BTreeMap<String, usize>,
    pub avg_confidence: f64,
    pub avg_success_rate: f64,
    pub total_occurrences: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStats {
    pub by_category: BTreeMap<String, usize>,
    pub by_scope: BTreeMap<String, usize>,
    pub avg_confidence: f64,
    pub avg_success_rate: f64,
    pub total_uses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub id: String,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsReview {
    pub low_confidence_lessons: Vec<String>,
    pub declining_lessons: Vec<String>,
    #[serde(default)]
    pub low_confidence_components: Vec<String>,
    pub low_usage_components: Vec<String>,
    /// Entities flagged after repeated overrides.
    pub overridden: Vec<String>,
}

impl NeedsReview {
    pub fn is_empty(&self) -> bool {
        self.low_confidence_lessons.is_empty()
            && self.declining_lessons.is_empty()
            && self.low_confidence_components.is_empty()
            && self.low_usage_components.is_empty()
            && self.overridden.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overview: Overview,
    #[serde(default)]
    pub lessons: LessonStats,
    #[serde(default)]
    pub components: ComponentStats,
    #[serde(default)]
    pub top_lessons: Vec<RankedEntry>,
    #[serde(default)]
    pub top_components: Vec<RankedEntry>,
    #[serde(default)]
    pub needs_review: NeedsReview,
}

impl Collection for AnalyticsSnapshot {
    const FILE: &'static str = paths::ANALYTICS_FILE;
}

// ---------------------------------------------------------------------------
// Recompute
// ---------------------------------------------------------------------------

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        ((sum / n as f64) * 1000.0).round() / 1000.0
    }
}

fn top(mut entries: Vec<RankedEntry>) -> Vec<RankedEntry> {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    entries.truncate(TOP_N);
    entries
}

pub fn recompute(
    lessons: &LessonsFile,
    components: &ComponentsFile,
    config: &LlkbConfig,
    now: DateTime<Utc>,
) -> AnalyticsSnapshot {
    let overview = Overview {
        total_lessons: lessons.lessons.len(),
        total_components: components.components.len(),
        total_quirks: lessons.app_quirks.len(),
        global_rules: lessons.global_rules.len(),
        deferred_candidates: components.deferred.len(),
    };

    let mut lesson_stats = LessonStats {
        avg_confidence: mean(
            lessons
                .lessons
                .iter()
                .map(|l| confidence::lesson_confidence(l, now)),
        ),
        avg_success_rate: mean(lessons.lessons.iter().map(|l| l.metrics.success_rate)),
        total_occurrences: lessons
            .lessons
            .iter()
            .map(|l| u64::from(l.metrics.occurrences))
            .sum(),
        ..Default::default()
    };
    for lesson in &lessons.lessons {
        *lesson_stats
            .by_category
            .entry(lesson.category.to_string())
            .or_default() += 1;
    }

    let mut component_stats = ComponentStats {
        avg_confidence: mean(
            components
                .components
                .iter()
                .map(|c| confidence::component_confidence(c, now)),
        ),
        avg_success_rate: mean(components.components.iter().map(|c| c.metrics.success_rate)),
        total_uses: components
            .components
            .iter()
            .map(|c| u64::from(c.metrics.total_uses))
            .sum(),
        ..Default::default()
    };
    for component in &components.components {
        *component_stats
            .by_category
            .entry(component.category.to_string())
            .or_default() += 1;
        *component_stats
            .by_scope
            .entry(component.scope.as_str().to_string())
            .or_default() += 1;
    }

    let top_lessons = top(
        lessons
            .lessons
            .iter()
            .map(|l| RankedEntry {
                id: l.id.clone(),
                title: l.title.clone(),
                score: l.metrics.success_rate * f64::from(l.metrics.occurrences),
            })
            .collect(),
    );

    let top_components = top(
        components
            .components
            .iter()
            .map(|c| RankedEntry {
                id: c.id.clone(),
                title: c.name.clone(),
                score: f64::from(c.metrics.total_uses),
            })
            .collect(),
    );

    let threshold = config.confidence.review_threshold;
    let mut needs_review = NeedsReview::default();
    for lesson in lessons
        .lessons
        .iter()
        .filter(|l| confidence::needs_review_lesson(l, config, now))
    {
        if confidence::lesson_confidence(lesson, now) < threshold {
            needs_review.low_confidence_lessons.push(lesson.id.clone());
        }
        if confidence::lesson_is_declining(lesson, &config.confidence) {
            needs_review.declining_lessons.push(lesson.id.clone());
        }
        if lesson.metrics.flagged_for_review {
            needs_review.overridden.push(lesson.id.clone());
        }
    }
    for component in components
        .components
        .iter()
        .filter(|c| confidence::needs_review_component(c, config, now))
    {
        if confidence::component_confidence(component, now) < threshold {
            needs_review.low_confidence_components.push(component.id.clone());
        }
        if confidence::component_underused(component, config, now) {
            needs_review.low_usage_components.push(component.id.clone());
        }
        if component.metrics.flagged_for_review {
            needs_review.overridden.push(component.id.clone());
        }
    }

    AnalyticsSnapshot {
        last_updated: Some(now),
        overview,
        lessons: lesson_stats,
        components: component_stats,
        top_lessons,
        top_components,
        needs_review,
    }
}

/// Rebuild the snapshot from the store and persist it.
pub fn refresh(store: &Store, config: &LlkbConfig) -> Result<AnalyticsSnapshot> {
    let lessons: LessonsFile = store.load()?;
    let components: ComponentsFile = store.load()?;
    let snapshot = recompute(&lessons, &components, config, Utc::now());
    store.save_atomic(&snapshot)?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CodePattern, Component, ComponentCategory, ComponentMetrics, ComponentSource,
        ConfidencePoint, Lesson, LessonCategory, LessonMetrics, Scope, Severity,
    };
    use chrono::Duration;
    use tempfile::TempDir;

    fn lesson(id: &str, category: LessonCategory, occurrences: u32, rate: f64, confidence: f64) -> Lesson {
        let mut metrics = LessonMetrics::new(Utc::now());
        metrics.occurrences = occurrences;
        metrics.success_rate = rate;
        metrics.confidence = confidence;
        Lesson {
            id: id.to_string(),
            title: format!("lesson {id}"),
            category,
            severity: Severity::Medium,
            scope: Scope::Universal,
            problem: String::new(),
            solution: String::new(),
            code_pattern: CodePattern::default(),
            applicable_to: Vec::new(),
            metrics,
            source: Default::default(),
            validation: Default::default(),
        }
    }

    fn component(id: &str, uses: u32, age_days: i64) -> Component {
        let mut metrics = ComponentMetrics::new(Utc::now() - Duration::days(age_days));
        metrics.total_uses = uses;
        metrics.confidence = 0.5;
        metrics.success_rate = 1.0;
        Component {
            id: id.to_string(),
            name: format!("helper{id}"),
            category: ComponentCategory::Ui,
            scope: Scope::AppSpecific,
            description: String::new(),
            file: String::new(),
            import_path: String::new(),
            signature: String::new(),
            examples: Vec::new(),
            metrics,
            source: ComponentSource::default(),
            related_lessons: Vec::new(),
            related_components: Vec::new(),
        }
    }

    #[test]
    fn empty_store_recomputes_to_zeroes() {
        let snap = recompute(
            &LessonsFile::default(),
            &ComponentsFile::default(),
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert_eq!(snap.overview.total_lessons, 0);
        assert_eq!(snap.lessons.avg_confidence, 0.0);
        assert!(snap.top_lessons.is_empty());
        assert!(snap.needs_review.is_empty());
    }

    #[test]
    fn totals_averages_and_rankings() {
        let mut declining = lesson("L003", LessonCategory::Timing, 6, 0.5, 0.3);
        declining.metrics.confidence_history = [0.8, 0.8, 0.8]
            .iter()
            .map(|&value| ConfidencePoint {
                timestamp: Utc::now(),
                value,
            })
            .collect();
        let lessons = LessonsFile {
            lessons: vec![
                lesson("L001", LessonCategory::Selector, 10, 0.9, 0.9),
                lesson("L002", LessonCategory::Selector, 2, 1.0, 0.2),
                declining,
            ],
            ..Default::default()
        };
        let components = ComponentsFile {
            components: vec![component("COMP001", 12, 5), component("COMP002", 0, 60)],
            ..Default::default()
        };

        let snap = recompute(&lessons, &components, &LlkbConfig::default(), Utc::now());
        assert_eq!(snap.overview.total_lessons, 3);
        assert_eq!(snap.overview.total_components, 2);
        assert_eq!(snap.lessons.by_category["selector"], 2);
        assert_eq!(snap.lessons.by_category["timing"], 1);
        assert_eq!(snap.lessons.total_occurrences, 18);
        // Live values: 0.95, 0.20 and 0.42, whatever is stored.
        assert!((snap.lessons.avg_confidence - 0.523).abs() < 1e-9);
        assert_eq!(snap.components.by_scope["app-specific"], 2);
        assert_eq!(snap.components.total_uses, 12);

        let order: Vec<_> = snap.top_lessons.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, ["L001", "L003", "L002"]);
        assert_eq!(snap.top_components[0].id, "COMP001");

        assert_eq!(snap.needs_review.low_confidence_lessons, ["L002"]);
        assert_eq!(snap.needs_review.declining_lessons, ["L003"]);
        assert_eq!(snap.needs_review.low_confidence_components, ["COMP002"]);
        assert_eq!(snap.needs_review.low_usage_components, ["COMP002"]);
    }

    #[test]
    fn idle_lesson_is_reviewed_despite_stored_confidence() {
        let mut idle = lesson("L001", LessonCategory::Auth, 4, 1.0, 0.4);
        idle.metrics.first_seen = Utc::now() - Duration::days(400);
        idle.metrics.last_success = Some(Utc::now() - Duration::days(365));
        let lessons = LessonsFile {
            lessons: vec![idle],
            ..Default::default()
        };
        // 0.4 × recency floor 0.7 = 0.28
        let snap = recompute(
            &lessons,
            &ComponentsFile::default(),
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert_eq!(snap.lessons.avg_confidence, 0.28);
        assert_eq!(snap.needs_review.low_confidence_lessons, ["L001"]);
    }

    #[test]
    fn overridden_entities_are_listed() {
        let mut flagged = lesson("L001", LessonCategory::Data, 10, 1.0, 1.0);
        flagged.metrics.flagged_for_review = true;
        let mut comp = component("COMP001", 12, 5);
        comp.metrics.flagged_for_review = true;
        let snap = recompute(
            &LessonsFile {
                lessons: vec![flagged],
                ..Default::default()
            },
            &ComponentsFile {
                components: vec![comp],
                ..Default::default()
            },
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert_eq!(snap.needs_review.overridden, ["L001", "COMP001"]);
        assert!(snap.needs_review.low_confidence_lessons.is_empty());
    }

    #[test]
    fn top_is_capped_at_five() {
        let lessons = LessonsFile {
            lessons: (1..=8)
                .map(|i| lesson(&format!("L{i:03}"), LessonCategory::Data, i, 1.0, 0.5))
                .collect(),
            ..Default::default()
        };
        let snap = recompute(
            &lessons,
            &ComponentsFile::default(),
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert_eq!(snap.top_lessons.len(), 5);
        assert_eq!(snap.top_lessons[0].id, "L008");
    }

    #[test]
    fn refresh_persists_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path());
        store
            .save_atomic(&LessonsFile {
                lessons: vec![lesson("L001", LessonCategory::Auth, 3, 1.0, 0.3)],
                ..Default::default()
            })
            .unwrap();
        let snap = refresh(&store, &LlkbConfig::default()).unwrap();
        let loaded: AnalyticsSnapshot = store.load().unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.overview.total_lessons, 1);
    }
}
