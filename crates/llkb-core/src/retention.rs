//! Retention policy: which lessons and components should be archived.
//!
//! App quirks are never archived automatically; closing one is a human call.

use crate::confidence;
use crate::config::LlkbConfig;
use crate::store::{ComponentsFile, LessonsFile};
use crate::types::{Component, Lesson};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveCandidate {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunePlan {
    pub lessons: Vec<ArchiveCandidate>,
    pub components: Vec<ArchiveCandidate>,
    pub history_partitions: Vec<NaiveDate>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty() && self.components.is_empty() && self.history_partitions.is_empty()
    }

    pub fn contains_lesson(&self, id: &str) -> bool {
        self.lessons.iter().any(|c| c.id == id)
    }

    pub fn contains_component(&self, id: &str) -> bool {
        self.components.iter().any(|c| c.id == id)
    }
}

pub fn lesson_archive_reason(
    lesson: &Lesson,
    config: &LlkbConfig,
    now: DateTime<Utc>,
) -> Option<String> {
    let reference = lesson.metrics.last_success.unwrap_or(lesson.metrics.first_seen);
    let idle_days = (now - reference).num_days();
    if idle_days > config.retention.max_lesson_age {
        return Some(match lesson.metrics.last_success {
            Some(_) => format!("stale: no success in {idle_days} days"),
            None => format!("stale: never succeeded in {idle_days} days"),
        });
    }

    if lesson.validation.human_reviewed {
        let current = confidence::lesson_confidence(lesson, now);
        if current < config.confidence.review_threshold {
            return Some(format!("low confidence after review ({current:.2})"));
        }
        if lesson.metrics.occurrences > 0
            && lesson.metrics.success_rate < config.retention.min_success_rate
        {
            return Some(format!(
                "success rate {:.2} below minimum {:.2} after review",
                lesson.metrics.success_rate, config.retention.min_success_rate
            ));
        }
    }
    None
}

pub fn component_archive_reason(
    component: &Component,
    config: &LlkbConfig,
    now: DateTime<Utc>,
) -> Option<String> {
    confidence::component_underused(component, config, now).then(|| {
        format!(
            "unused: {} uses in {} days",
            component.metrics.total_uses,
            (now - component.metrics.created_at).num_days()
        )
    })
}

/// Lessons and components due for archiving. History partitions are filled
/// in by the caller, which owns the history log.
pub fn plan(
    lessons: &LessonsFile,
    components: &ComponentsFile,
    config: &LlkbConfig,
    now: DateTime<Utc>,
) -> PrunePlan {
    PrunePlan {
        lessons: lessons
            .lessons
            .iter()
            .filter_map(|l| {
                lesson_archive_reason(l, config, now).map(|reason| ArchiveCandidate {
                    id: l.id.clone(),
                    reason,
                })
            })
            .collect(),
        components: components
            .components
            .iter()
            .filter_map(|c| {
                component_archive_reason(c, config, now).map(|reason| ArchiveCandidate {
                    id: c.id.clone(),
                    reason,
                })
            })
            .collect(),
        history_partitions: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AppQuirk, CodePattern, ComponentCategory, ComponentMetrics, ComponentSource,
        LessonCategory, LessonMetrics, Scope, Severity, Validation,
    };
    use chrono::Duration;

    fn lesson(id: &str, first_seen_days: i64, last_success_days: Option<i64>) -> Lesson {
        let now = Utc::now();
        let mut metrics = LessonMetrics::new(now - Duration::days(first_seen_days));
        metrics.occurrences = 5;
        metrics.successes = 5;
        metrics.success_rate = 1.0;
        metrics.confidence = 0.8;
        metrics.last_success = last_success_days.map(|d| now - Duration::days(d));
        Lesson {
            id: id.to_string(),
            title: id.to_string(),
            category: LessonCategory::Timing,
            severity: Severity::Low,
            scope: Scope::Universal,
            problem: String::new(),
            solution: String::new(),
            code_pattern: CodePattern::default(),
            applicable_to: Vec::new(),
            metrics,
            source: Default::default(),
            validation: Validation::default(),
        }
    }

    fn component(id: &str, uses: u32, age_days: i64) -> Component {
        let mut metrics = ComponentMetrics::new(Utc::now() - Duration::days(age_days));
        metrics.total_uses = uses;
        Component {
            id: id.to_string(),
            name: id.to_string(),
            category: ComponentCategory::Navigation,
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
    fn stale_and_reviewed_lessons_are_planned() {
        let mut reviewed_low = lesson("L004", 10, Some(1));
        reviewed_low.validation.human_reviewed = true;
        reviewed_low.metrics.occurrences = 2;
        let mut unreviewed_low = lesson("L005", 10, Some(1));
        unreviewed_low.metrics.occurrences = 2;

        let lessons = LessonsFile {
            lessons: vec![
                lesson("L001", 200, Some(5)),
                lesson("L002", 200, Some(120)),
                lesson("L003", 100, None),
                reviewed_low,
                unreviewed_low,
            ],
            ..Default::default()
        };
        let p = plan(
            &lessons,
            &ComponentsFile::default(),
            &LlkbConfig::default(),
            Utc::now(),
        );
        let ids: Vec<_> = p.lessons.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["L002", "L003", "L004"]);
        assert!(p.lessons[0].reason.starts_with("stale"));
        assert!(p.lessons[2].reason.contains("after review"));
    }

    #[test]
    fn underused_old_components_are_planned() {
        let components = ComponentsFile {
            components: vec![
                component("COMP001", 0, 45),
                component("COMP002", 0, 5),
                component("COMP003", 7, 400),
            ],
            ..Default::default()
        };
        let p = plan(
            &LessonsFile::default(),
            &components,
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert_eq!(p.components.len(), 1);
        assert!(p.contains_component("COMP001"));
        assert!(!p.contains_component("COMP003"));
    }

    #[test]
    fn quirks_are_never_planned() {
        let lessons = LessonsFile {
            app_quirks: vec![AppQuirk {
                id: "AQ001".to_string(),
                component: "DatePicker".to_string(),
                description: "ignores typed input".to_string(),
                impact: String::new(),
                workaround: "click the calendar".to_string(),
                permanent: false,
                issue_link: None,
                affected_runs: Vec::new(),
                discovered_at: Utc::now() - Duration::days(1000),
            }],
            ..Default::default()
        };
        let p = plan(
            &lessons,
            &ComponentsFile::default(),
            &LlkbConfig::default(),
            Utc::now(),
        );
        assert!(p.is_empty());
    }

    #[test]
    fn reviewed_lesson_uses_decayed_confidence() {
        // Stored 0.8 is stale: 4 occurrences idle for 80 days is
        // 0.4 × 0.73 × 1.2 boost.
        let mut idle = lesson("L001", 100, Some(80));
        idle.metrics.occurrences = 4;
        idle.validation.human_reviewed = true;
        let reason = lesson_archive_reason(&idle, &LlkbConfig::default(), Utc::now()).unwrap();
        assert_eq!(reason, "low confidence after review (0.35)");
    }
}
