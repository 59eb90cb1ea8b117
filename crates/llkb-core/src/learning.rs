//! Learning API: the surface calling tools use.
//!
//! Store failures (lock timeouts, corrupt files) are returned to the caller.
//! History and analytics bookkeeping is best-effort and only logged, so a
//! test-generation run never fails because of it.

use crate::analytics::{self, AnalyticsSnapshot};
use crate::confidence;
use crate::config::LlkbConfig;
use crate::error::{LlkbError, Result};
use crate::history::{EventKind, HistoryEvent, HistoryLog};
use crate::rate_limit::{self, DeferReason, ExtractionDecision, RunContext};
use crate::retention::{self, PrunePlan};
use crate::similarity;
use crate::store::{ArchiveFile, ComponentsFile, LessonsFile, Store};
use crate::types::{
    next_id, AppQuirk, CodePattern, Component, ComponentMetrics, ComponentSource,
    DeferredCandidate, EntityKind, ExtractionCandidate, Lesson, LessonCategory, LessonMetrics,
    LessonSource, Scope, Severity, Validation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

const RELEVANCE_KEYWORDS: f64 = 0.4;
const RELEVANCE_CONFIDENCE: f64 = 0.3;
const RELEVANCE_RECENCY: f64 = 0.15;
const RELEVANCE_SUCCESS: f64 = 0.15;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A fix observed during a run, offered as a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternObservation {
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
    pub tags: Vec<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuirkReport {
    pub component: String,
    pub description: String,
    #[serde(default)]
    pub impact: String,
    pub workaround: String,
    #[serde(default)]
    pub permanent: bool,
    #[serde(default)]
    pub issue_link: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub text: String,
    pub tags: Vec<String>,
    /// Matches either a lesson or a component category name.
    pub category: Option<String>,
    pub scope: Option<Scope>,
    /// Overrides `extraction.confidenceThreshold`.
    pub min_confidence: Option<f64>,
}

impl QueryContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnOutcome {
    pub lesson_id: String,
    pub created: bool,
    pub occurrences: u32,
    pub confidence: f64,
    /// Similarity to the existing lesson the observation was merged into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_similarity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonUpdate {
    pub lesson_id: String,
    pub occurrences: u32,
    pub success_rate: f64,
    pub confidence: f64,
    pub declining: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUpdate {
    pub component_id: String,
    pub total_uses: u32,
    pub success_rate: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuirkOutcome {
    pub quirk_id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub decision: ExtractionDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    pub deferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideOutcome {
    pub entity_id: String,
    pub overrides: u32,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatch {
    pub kind: EntityKind,
    pub id: String,
    pub title: String,
    pub confidence: f64,
    pub success_rate: f64,
    pub relevance: f64,
    /// What to apply: the lesson's fixed code or the component's import.
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub plan: PrunePlan,
    pub applied: bool,
}

// ---------------------------------------------------------------------------
// Llkb
// ---------------------------------------------------------------------------

pub struct Llkb {
    store: Store,
    history: HistoryLog,
    config: LlkbConfig,
    pending_mutations: usize,
}

impl Llkb {
    /// Open the knowledge base at `root`. Config problems fall back to the
    /// defaults with a warning.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let store = Store::open(root);
        let config = store.config();
        Self::with_store(store, config)
    }

    pub fn with_store(store: Store, config: LlkbConfig) -> Self {
        let history = store.history();
        Self {
            store,
            history,
            config,
            pending_mutations: 0,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &LlkbConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    fn log(&self, run: &RunContext, kind: EventKind, summary: String) {
        self.history
            .append(&HistoryEvent::new(kind, &run.run_id, &run.tool, summary));
    }

    /// Count a mutation and refresh analytics once a batch has accumulated.
    fn after_mutation(&mut self, run: &RunContext) {
        self.pending_mutations += 1;
        if self.pending_mutations < self.config.learning.analytics_batch_size {
            return;
        }
        self.pending_mutations = 0;
        match analytics::refresh(&self.store, &self.config) {
            Ok(snapshot) => self.log_metrics_updated(run, &snapshot),
            Err(e) => tracing::warn!(error = %e, "analytics refresh failed"),
        }
    }

    fn log_metrics_updated(&self, run: &RunContext, snapshot: &AnalyticsSnapshot) {
        self.log(
            run,
            EventKind::MetricsUpdated {
                lessons: snapshot.overview.total_lessons,
                components: snapshot.overview.total_components,
            },
            format!(
                "analytics recalculated: {} lessons, {} components",
                snapshot.overview.total_lessons, snapshot.overview.total_components
            ),
        );
    }

    /// Recompute and persist analytics now.
    pub fn refresh_analytics(&mut self, run: &RunContext) -> Result<AnalyticsSnapshot> {
        self.pending_mutations = 0;
        let snapshot = analytics::refresh(&self.store, &self.config)?;
        self.log_metrics_updated(run, &snapshot);
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Lessons
    // -----------------------------------------------------------------------

    /// Merge the observation into a near-duplicate lesson of the same
    /// category, or create a new lesson.
    pub fn record_pattern_learned(
        &mut self,
        run: &RunContext,
        observation: &PatternObservation,
        success: bool,
    ) -> Result<LearnOutcome> {
        let threshold = self.config.extraction.similarity_threshold;
        let now = Utc::now();
        let store = &self.store;
        let outcome = store.update_with_lock(|file: &mut LessonsFile| {
            let fingerprint = observation.code_pattern.fingerprint();
            let candidates = file
                .lessons
                .iter()
                .filter(|l| l.category == observation.category)
                .map(|l| (l.id.clone(), l.code_pattern.fingerprint()));
            let best = similarity::find_near_duplicates(&fingerprint, candidates, threshold)
                .into_iter()
                .next();

            if let Some(best) = best {
                let lesson = file
                    .lesson_mut(&best.id)
                    .ok_or_else(|| LlkbError::LessonNotFound(best.id.clone()))?;
                lesson.metrics.record_outcome(success, now);
                for tag in &observation.tags {
                    if !lesson.applicable_to.contains(tag) {
                        lesson.applicable_to.push(tag.clone());
                    }
                }
                let confidence = confidence::refresh_lesson(lesson, now);
                return Ok(LearnOutcome {
                    lesson_id: lesson.id.clone(),
                    created: false,
                    occurrences: lesson.metrics.occurrences,
                    confidence,
                    merged_similarity: Some(best.similarity),
                });
            }

            // Read under the lessons lock, which prune holds while archiving.
            let archive: ArchiveFile = store.load()?;
            let taken = file.lessons.iter().chain(archive.lessons.iter());
            let id = next_id("L", taken.map(|l| l.id.as_str()));
            let mut lesson = new_lesson(id, run, observation, now);
            lesson.metrics.record_outcome(success, now);
            let confidence = confidence::refresh_lesson(&mut lesson, now);
            let outcome = LearnOutcome {
                lesson_id: lesson.id.clone(),
                created: true,
                occurrences: lesson.metrics.occurrences,
                confidence,
                merged_similarity: None,
            };
            file.lessons.push(lesson);
            Ok(outcome)
        })?;

        let kind = if outcome.created {
            EventKind::LessonCreated {
                lesson_id: outcome.lesson_id.clone(),
            }
        } else {
            EventKind::LessonApplied {
                lesson_id: outcome.lesson_id.clone(),
                success,
            }
        };
        let verb = if outcome.created { "created" } else { "merged into" };
        self.log(
            run,
            kind,
            format!("{verb} {}: {}", outcome.lesson_id, observation.title),
        );
        self.after_mutation(run);
        Ok(outcome)
    }

    /// Record a known lesson being applied. No similarity search.
    pub fn record_lesson_applied(
        &mut self,
        run: &RunContext,
        lesson_id: &str,
        success: bool,
    ) -> Result<LessonUpdate> {
        let now = Utc::now();
        let cfg = self.config.confidence.clone();
        let update = self.store.update_with_lock(|file: &mut LessonsFile| {
            let lesson = file
                .lesson_mut(lesson_id)
                .ok_or_else(|| LlkbError::LessonNotFound(lesson_id.to_string()))?;
            lesson.metrics.record_outcome(success, now);
            let confidence = confidence::refresh_lesson(lesson, now);
            Ok(LessonUpdate {
                lesson_id: lesson.id.clone(),
                occurrences: lesson.metrics.occurrences,
                success_rate: lesson.metrics.success_rate,
                confidence,
                declining: confidence::lesson_is_declining(lesson, &cfg),
            })
        })?;

        let outcome = if success { "succeeded" } else { "failed" };
        self.log(
            run,
            EventKind::LessonApplied {
                lesson_id: update.lesson_id.clone(),
                success,
            },
            format!("applied {} ({outcome})", update.lesson_id),
        );
        self.after_mutation(run);
        Ok(update)
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    pub fn record_component_used(
        &mut self,
        run: &RunContext,
        component_id: &str,
        location: &str,
        success: bool,
    ) -> Result<ComponentUpdate> {
        let now = Utc::now();
        let update = self.store.update_with_lock(|file: &mut ComponentsFile| {
            let component = file
                .component_mut(component_id)
                .ok_or_else(|| LlkbError::ComponentNotFound(component_id.to_string()))?;
            component.metrics.record_use(location, success, now);
            let confidence = confidence::refresh_component(component, now);
            Ok(ComponentUpdate {
                component_id: component.id.clone(),
                total_uses: component.metrics.total_uses,
                success_rate: component.metrics.success_rate,
                confidence,
            })
        })?;

        self.log(
            run,
            EventKind::ComponentUsed {
                component_id: update.component_id.clone(),
                success,
            },
            format!("used {} in {location}", update.component_id),
        );
        self.after_mutation(run);
        Ok(update)
    }

    /// Run the rate limiter and, if it approves, create the component.
    /// Rate-limited candidates are kept as deferred for a later pass.
    pub fn extract_component(
        &mut self,
        run: &mut RunContext,
        candidate: &ExtractionCandidate,
    ) -> Result<ExtractionOutcome> {
        let components: ComponentsFile = self.store.load()?;
        let decision = rate_limit::should_extract_predictively(
            candidate,
            &components.components,
            &self.history,
            &self.config.extraction,
            run,
        );
        for warning in &decision.warnings {
            tracing::warn!(candidate = %candidate.name, "{warning}");
        }

        if !decision.extract {
            let defer = decision
                .blocked_by
                .as_ref()
                .is_some_and(DeferReason::is_rate_limit);
            if defer {
                self.defer(run, candidate, &decision.reason)?;
            }
            tracing::debug!(candidate = %candidate.name, reason = %decision.reason, "extraction skipped");
            return Ok(ExtractionOutcome {
                decision,
                component_id: None,
                deferred: defer,
            });
        }

        // Re-check duplicates under the lock: another run may have extracted
        // the same code since the decision was taken.
        let threshold = self.config.extraction.similarity_threshold;
        let now = Utc::now();
        let store = &self.store;
        let created = store.update_with_lock(|file: &mut ComponentsFile| {
            let existing = file
                .components
                .iter()
                .map(|c| (c.id.as_str(), c.source.original_code.as_str()));
            if let Some(dup) = similarity::find_near_duplicates(&candidate.code, existing, threshold)
                .into_iter()
                .next()
            {
                return Ok(Err(DeferReason::NearDuplicate {
                    existing_id: dup.id,
                    similarity: dup.similarity,
                }));
            }
            let archive: ArchiveFile = store.load()?;
            let taken = file.components.iter().chain(archive.components.iter());
            let id = next_id("COMP", taken.map(|c| c.id.as_str()));
            let mut component = new_component(id, run, candidate, now);
            confidence::refresh_component(&mut component, now);
            let id = component.id.clone();
            file.components.push(component);
            file.deferred.retain(|d| d.candidate.code != candidate.code);
            Ok(Ok(id))
        })?;

        match created {
            Ok(id) => {
                run.record_predictive_extraction();
                self.log(
                    run,
                    EventKind::ComponentExtracted {
                        component_id: id.clone(),
                        predictive: true,
                    },
                    format!("extracted {id} ({})", candidate.name),
                );
                self.after_mutation(run);
                Ok(ExtractionOutcome {
                    decision,
                    component_id: Some(id),
                    deferred: false,
                })
            }
            Err(reason) => Ok(ExtractionOutcome {
                decision: ExtractionDecision {
                    extract: false,
                    reason: reason.to_string(),
                    suggestion: match &reason {
                        DeferReason::NearDuplicate { existing_id, .. } => Some(existing_id.clone()),
                        _ => None,
                    },
                    blocked_by: Some(reason),
                    warnings: decision.warnings,
                },
                component_id: None,
                deferred: false,
            }),
        }
    }

    fn defer(&self, run: &RunContext, candidate: &ExtractionCandidate, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.store.update_with_lock(|file: &mut ComponentsFile| {
            file.deferred.retain(|d| d.candidate.code != candidate.code);
            file.deferred.push(DeferredCandidate {
                candidate: candidate.clone(),
                reason: reason.to_string(),
                deferred_at: now,
                run_id: run.run_id.clone(),
            });
            Ok(())
        })?;
        self.log(
            run,
            EventKind::ExtractionDeferred {
                name: candidate.name.clone(),
                reason: reason.to_string(),
            },
            format!("deferred {}: {reason}", candidate.name),
        );
        Ok(())
    }

    pub fn deferred(&self) -> Result<Vec<DeferredCandidate>> {
        let file: ComponentsFile = self.store.load()?;
        Ok(file.deferred)
    }

    /// Re-evaluate deferred candidates. Candidates that turned out to be
    /// duplicates or too small are dropped; rate-limited ones stay deferred.
    pub fn retry_deferred(&mut self, run: &mut RunContext) -> Result<Vec<ExtractionOutcome>> {
        let pending = self.deferred()?;
        let mut outcomes = Vec::with_capacity(pending.len());
        for entry in pending {
            let outcome = self.extract_component(run, &entry.candidate)?;
            let drop = matches!(
                outcome.decision.blocked_by,
                Some(DeferReason::NearDuplicate { .. } | DeferReason::TooSmall { .. })
            );
            if drop {
                let code = entry.candidate.code.clone();
                self.store.update_with_lock(|file: &mut ComponentsFile| {
                    file.deferred.retain(|d| d.candidate.code != code);
                    Ok(())
                })?;
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // Quirks
    // -----------------------------------------------------------------------

    /// Record an app quirk. A report matching an existing quirk (same
    /// component and description) only adds this run to it.
    pub fn record_quirk(&mut self, run: &RunContext, report: &QuirkReport) -> Result<QuirkOutcome> {
        let now = Utc::now();
        let outcome = self.store.update_with_lock(|file: &mut LessonsFile| {
            let existing = file.app_quirks.iter_mut().find(|q| {
                q.component.eq_ignore_ascii_case(report.component.trim())
                    && q.description.trim().eq_ignore_ascii_case(report.description.trim())
            });
            if let Some(quirk) = existing {
                if !quirk.affected_runs.contains(&run.run_id) {
                    quirk.affected_runs.push(run.run_id.clone());
                }
                return Ok(QuirkOutcome {
                    quirk_id: quirk.id.clone(),
                    created: false,
                });
            }
            let id = next_id("AQ", file.app_quirks.iter().map(|q| q.id.as_str()));
            file.app_quirks.push(AppQuirk {
                id: id.clone(),
                component: report.component.trim().to_string(),
                description: report.description.trim().to_string(),
                impact: report.impact.clone(),
                workaround: report.workaround.clone(),
                permanent: report.permanent,
                issue_link: report.issue_link.clone(),
                affected_runs: vec![run.run_id.clone()],
                discovered_at: now,
            });
            Ok(QuirkOutcome {
                quirk_id: id,
                created: true,
            })
        })?;

        let verb = if outcome.created { "discovered" } else { "seen again" };
        self.log(
            run,
            EventKind::QuirkDiscovered {
                quirk_id: outcome.quirk_id.clone(),
            },
            format!("quirk {} {verb}: {}", outcome.quirk_id, report.component),
        );
        self.after_mutation(run);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Overrides
    // -----------------------------------------------------------------------

    /// Record a caller rejecting a suggested lesson/component. After
    /// `overrideReviewThreshold` overrides the entity is flagged for review
    /// and no longer suggested.
    pub fn record_override(
        &mut self,
        run: &RunContext,
        entity_id: &str,
        reason: &str,
    ) -> Result<OverrideOutcome> {
        let threshold = self.config.learning.override_review_threshold;
        let kind =
            EntityKind::of(entity_id).ok_or_else(|| LlkbError::InvalidEntityId(entity_id.to_string()))?;

        let (overrides, flagged) = match kind {
            EntityKind::Lesson => self.store.update_with_lock(|file: &mut LessonsFile| {
                let lesson = file
                    .lesson_mut(entity_id)
                    .ok_or_else(|| LlkbError::LessonNotFound(entity_id.to_string()))?;
                lesson.metrics.overrides += 1;
                if lesson.metrics.overrides >= threshold {
                    lesson.metrics.flagged_for_review = true;
                }
                Ok((lesson.metrics.overrides, lesson.metrics.flagged_for_review))
            })?,
            EntityKind::Component => self.store.update_with_lock(|file: &mut ComponentsFile| {
                let component = file
                    .component_mut(entity_id)
                    .ok_or_else(|| LlkbError::ComponentNotFound(entity_id.to_string()))?;
                component.metrics.overrides += 1;
                if component.metrics.overrides >= threshold {
                    component.metrics.flagged_for_review = true;
                }
                Ok((
                    component.metrics.overrides,
                    component.metrics.flagged_for_review,
                ))
            })?,
        };

        if flagged {
            tracing::warn!(entity = entity_id, overrides, "entity flagged for human review");
        }
        self.history.append(
            &HistoryEvent::new(
                EventKind::PatternOverridden {
                    entity_id: entity_id.to_string(),
                    overrides,
                    flagged,
                },
                &run.run_id,
                &run.tool,
                format!("override #{overrides} of {entity_id}"),
            )
            .with_metadata(serde_json::json!({ "reason": reason })),
        );
        self.after_mutation(run);
        Ok(OverrideOutcome {
            entity_id: entity_id.to_string(),
            overrides,
            flagged,
        })
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Lessons and components worth reusing for `ctx`, most relevant first.
    /// Results are not capped; callers truncate to their own budget.
    pub fn query(&self, ctx: &QueryContext) -> Result<Vec<QueryMatch>> {
        let lessons: LessonsFile = self.store.load()?;
        let components: ComponentsFile = self.store.load()?;
        let now = Utc::now();
        let min_confidence = ctx
            .min_confidence
            .unwrap_or(self.config.extraction.confidence_threshold);
        let max_age = self.config.retention.max_lesson_age.max(1) as f64;

        let mut query_words: BTreeSet<String> = similarity::keywords(&ctx.text);
        for tag in &ctx.tags {
            query_words.extend(similarity::keywords(tag));
        }

        let recency = |ts: Option<DateTime<Utc>>| -> f64 {
            ts.map(|t| (1.0 - (now - t).num_days().max(0) as f64 / max_age).clamp(0.0, 1.0))
                .unwrap_or(0.0)
        };
        let relevance = |overlap: f64, confidence: f64, recency: f64, success: f64| {
            RELEVANCE_KEYWORDS * overlap
                + RELEVANCE_CONFIDENCE * confidence
                + RELEVANCE_RECENCY * recency
                + RELEVANCE_SUCCESS * success
        };

        let mut matches = Vec::new();

        for lesson in &lessons.lessons {
            let confidence = confidence::lesson_confidence(lesson, now);
            if lesson.metrics.flagged_for_review || confidence < min_confidence {
                continue;
            }
            if ctx.category.as_deref().is_some_and(|c| c != lesson.category.as_str()) {
                continue;
            }
            if ctx.scope.is_some_and(|s| s != lesson.scope) {
                continue;
            }
            let text = format!(
                "{} {} {} {}",
                lesson.title,
                lesson.problem,
                lesson.solution,
                lesson.applicable_to.join(" ")
            );
            let overlap = similarity::keyword_overlap(&query_words, &text);
            if !query_words.is_empty() && overlap == 0.0 {
                continue;
            }
            matches.push(QueryMatch {
                kind: EntityKind::Lesson,
                id: lesson.id.clone(),
                title: lesson.title.clone(),
                confidence,
                success_rate: lesson.metrics.success_rate,
                relevance: relevance(
                    overlap,
                    confidence,
                    recency(lesson.metrics.last_success.or(lesson.metrics.last_applied)),
                    lesson.metrics.success_rate,
                ),
                suggestion: if lesson.code_pattern.after.is_empty() {
                    lesson.solution.clone()
                } else {
                    lesson.code_pattern.after.clone()
                },
            });
        }

        for component in &components.components {
            let confidence = confidence::component_confidence(component, now);
            if component.metrics.flagged_for_review || confidence < min_confidence {
                continue;
            }
            if ctx
                .category
                .as_deref()
                .is_some_and(|c| c != component.category.as_str())
            {
                continue;
            }
            if ctx.scope.is_some_and(|s| s != component.scope) {
                continue;
            }
            let text = format!(
                "{} {} {}",
                component.name, component.description, component.signature
            );
            let overlap = similarity::keyword_overlap(&query_words, &text);
            if !query_words.is_empty() && overlap == 0.0 {
                continue;
            }
            matches.push(QueryMatch {
                kind: EntityKind::Component,
                id: component.id.clone(),
                title: component.name.clone(),
                confidence,
                success_rate: component.metrics.success_rate,
                relevance: relevance(
                    overlap,
                    confidence,
                    recency(component.metrics.last_used),
                    component.metrics.success_rate,
                ),
                suggestion: if component.import_path.is_empty() {
                    component.name.clone()
                } else {
                    format!("import {{ {} }} from '{}'", component.name, component.import_path)
                },
            });
        }

        matches.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matches)
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    /// Plan (and with `force`, apply) the retention policy.
    pub fn prune(&mut self, run: &RunContext, force: bool) -> Result<PruneReport> {
        let lessons: LessonsFile = self.store.load()?;
        let components: ComponentsFile = self.store.load()?;
        let now = Utc::now();
        let mut plan = retention::plan(&lessons, &components, &self.config, now);
        plan.history_partitions = self
            .history
            .expired_partitions(self.config.retention.history_retention_days, now.date_naive())?;

        if !force || plan.is_empty() {
            return Ok(PruneReport {
                plan,
                applied: false,
            });
        }

        // Archive before removing so an interrupted prune duplicates rather
        // than loses entries.
        let store = &self.store;
        let archived_lessons = store.update_with_lock(|file: &mut LessonsFile| {
            let (gone, kept): (Vec<Lesson>, Vec<Lesson>) = std::mem::take(&mut file.lessons)
                .into_iter()
                .partition(|l| plan.contains_lesson(&l.id));
            file.lessons = kept;
            if !gone.is_empty() {
                store.update_with_lock(|archive: &mut ArchiveFile| {
                    archive.lessons.extend(gone.iter().cloned());
                    Ok(())
                })?;
            }
            Ok(gone.len())
        })?;
        let archived_components = store.update_with_lock(|file: &mut ComponentsFile| {
            let (gone, kept): (Vec<Component>, Vec<Component>) =
                std::mem::take(&mut file.components)
                    .into_iter()
                    .partition(|c| plan.contains_component(&c.id));
            file.components = kept;
            if !gone.is_empty() {
                store.update_with_lock(|archive: &mut ArchiveFile| {
                    archive.components.extend(gone.iter().cloned());
                    Ok(())
                })?;
            }
            Ok(gone.len())
        })?;
        self.history
            .prune(self.config.retention.history_retention_days, now.date_naive())?;

        for item in plan.lessons.iter().chain(plan.components.iter()) {
            self.log(
                run,
                EventKind::EntityArchived {
                    entity_id: item.id.clone(),
                    reason: item.reason.clone(),
                },
                format!("archived {}: {}", item.id, item.reason),
            );
        }
        tracing::debug!(
            lessons = archived_lessons,
            components = archived_components,
            partitions = plan.history_partitions.len(),
            "prune applied"
        );

        if let Err(e) = self.refresh_analytics(run) {
            tracing::warn!(error = %e, "analytics refresh after prune failed");
        }
        Ok(PruneReport {
            plan,
            applied: true,
        })
    }
}

fn new_lesson(
    id: String,
    run: &RunContext,
    observation: &PatternObservation,
    now: DateTime<Utc>,
) -> Lesson {
    Lesson {
        id,
        title: observation.title.clone(),
        category: observation.category,
        severity: observation.severity,
        scope: observation.scope,
        problem: observation.problem.clone(),
        solution: observation.solution.clone(),
        code_pattern: observation.code_pattern.clone(),
        applicable_to: observation.tags.clone(),
        metrics: LessonMetrics::new(now),
        source: LessonSource {
            run_id: run.run_id.clone(),
            tool: run.tool.clone(),
            file: observation.file.clone(),
            line: observation.line,
        },
        validation: Validation::default(),
    }
}

fn new_component(
    id: String,
    run: &RunContext,
    candidate: &ExtractionCandidate,
    now: DateTime<Utc>,
) -> Component {
    Component {
        id,
        name: candidate.name.clone(),
        category: candidate.category,
        scope: candidate.scope,
        description: candidate.description.clone(),
        file: candidate.file.clone(),
        import_path: candidate.import_path.clone(),
        signature: candidate.signature.clone(),
        examples: Vec::new(),
        metrics: ComponentMetrics::new(now),
        source: ComponentSource {
            original_code: candidate.code.clone(),
            extracted_from: run.run_id.clone(),
            extracted_by: run.tool.clone(),
            predictive: true,
        },
        related_lessons: candidate.related_lessons.clone(),
        related_components: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
