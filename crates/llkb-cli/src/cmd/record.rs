use crate::cmd::{open_store, CLI_TOOL};
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use llkb_core::learning::{PatternObservation, QuirkReport};
use llkb_core::types::{
    CodePattern, ComponentCategory, ExtractionCandidate, LessonCategory, Scope, Severity,
};
use llkb_core::{Llkb, RunContext};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// A known lesson was applied
    LessonApplied {
        /// Lesson id (e.g. L003)
        id: String,
        /// The fix did not work
        #[arg(long)]
        failed: bool,
    },

    /// A component was used in a test
    ComponentUsed {
        /// Component id (e.g. COMP002)
        id: String,
        /// Test file that used it
        #[arg(long)]
        location: String,
        #[arg(long)]
        failed: bool,
    },

    /// A fix observed during a run; merged into a near-duplicate lesson if one exists
    Pattern {
        #[arg(long)]
        title: String,
        /// selector, timing, quirk, auth, data, assertion, navigation
        #[arg(long)]
        category: LessonCategory,
        #[arg(long)]
        problem: String,
        #[arg(long)]
        solution: String,
        /// Code before the fix
        #[arg(long)]
        before: Option<String>,
        /// Code after the fix
        #[arg(long)]
        after: Option<String>,
        /// critical, high, medium, low
        #[arg(long, value_parser = parse_serde::<Severity>)]
        severity: Option<Severity>,
        /// universal, framework-specific, app-specific
        #[arg(long, value_parser = parse_serde::<Scope>)]
        scope: Option<Scope>,
        /// Applicability tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        failed: bool,
    },

    /// An application quirk tests must work around
    Quirk {
        #[arg(long)]
        component: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        workaround: String,
        #[arg(long, default_value = "")]
        impact: String,
        #[arg(long)]
        permanent: bool,
        #[arg(long)]
        issue: Option<String>,
    },

    /// A suggested lesson or component was rejected
    Override {
        /// Lesson or component id
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Offer code for predictive component extraction
    Extract {
        #[arg(long)]
        name: String,
        /// selector, timing, auth, data, assertion, navigation, ui
        #[arg(long)]
        category: ComponentCategory,
        /// File containing the candidate code
        #[arg(long)]
        code_file: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        import_path: String,
        /// Run id to count against (default: a fresh run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Re-evaluate deferred extraction candidates
    RetryDeferred,
}

fn parse_serde<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value '{s}'"))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: RecordSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let config = store.config();
    let mut llkb = Llkb::with_store(store, config);
    let run = RunContext::new(CLI_TOOL);

    match subcmd {
        RecordSubcommand::LessonApplied { id, failed } => {
            let update = llkb
                .record_lesson_applied(&run, &id, !failed)
                .with_context(|| format!("failed to record application of {id}"))?;
            if json {
                return print_json(&update);
            }
            println!(
                "{}: {} occurrences, success rate {:.2}, confidence {:.2}",
                update.lesson_id, update.occurrences, update.success_rate, update.confidence
            );
            if update.declining {
                println!("warning: confidence is declining");
            }
        }

        RecordSubcommand::ComponentUsed {
            id,
            location,
            failed,
        } => {
            let update = llkb
                .record_component_used(&run, &id, &location, !failed)
                .with_context(|| format!("failed to record use of {id}"))?;
            if json {
                return print_json(&update);
            }
            println!(
                "{}: {} uses, success rate {:.2}, confidence {:.2}",
                update.component_id, update.total_uses, update.success_rate, update.confidence
            );
        }

        RecordSubcommand::Pattern {
            title,
            category,
            problem,
            solution,
            before,
            after,
            severity,
            scope,
            tags,
            failed,
        } => {
            let observation = PatternObservation {
                title,
                category,
                severity: severity.unwrap_or_default(),
                scope: scope.unwrap_or_default(),
                problem,
                solution,
                code_pattern: CodePattern {
                    before: before.unwrap_or_default(),
                    after: after.unwrap_or_default(),
                },
                tags,
                file: None,
                line: None,
            };
            let outcome = llkb
                .record_pattern_learned(&run, &observation, !failed)
                .context("failed to record pattern")?;
            if json {
                return print_json(&outcome);
            }
            match outcome.merged_similarity {
                Some(sim) => println!(
                    "merged into {} (similarity {sim:.2}): {} occurrences, confidence {:.2}",
                    outcome.lesson_id, outcome.occurrences, outcome.confidence
                ),
                None => println!(
                    "created {}: confidence {:.2}",
                    outcome.lesson_id, outcome.confidence
                ),
            }
        }

        RecordSubcommand::Quirk {
            component,
            description,
            workaround,
            impact,
            permanent,
            issue,
        } => {
            let report = QuirkReport {
                component,
                description,
                impact,
                workaround,
                permanent,
                issue_link: issue,
            };
            let outcome = llkb
                .record_quirk(&run, &report)
                .context("failed to record quirk")?;
            if json {
                return print_json(&outcome);
            }
            let verb = if outcome.created { "created" } else { "updated" };
            println!("{verb} {}", outcome.quirk_id);
        }

        RecordSubcommand::Override { id, reason } => {
            let outcome = llkb
                .record_override(&run, &id, &reason)
                .with_context(|| format!("failed to record override of {id}"))?;
            if json {
                return print_json(&outcome);
            }
            println!("{}: {} overrides", outcome.entity_id, outcome.overrides);
            if outcome.flagged {
                println!("flagged for review; no longer suggested");
            }
        }

        RecordSubcommand::Extract {
            name,
            category,
            code_file,
            description,
            import_path,
            run: run_id,
        } => {
            let code = std::fs::read_to_string(&code_file)
                .with_context(|| format!("failed to read {}", code_file.display()))?;
            let candidate = ExtractionCandidate {
                name,
                category,
                scope: Default::default(),
                description,
                code,
                file: code_file.display().to_string(),
                import_path,
                signature: String::new(),
                related_lessons: Vec::new(),
            };
            let mut run = match run_id {
                Some(id) => RunContext::with_id(id, CLI_TOOL),
                None => run,
            };
            let outcome = llkb
                .extract_component(&mut run, &candidate)
                .context("failed to extract component")?;
            if json {
                return print_json(&outcome);
            }
            match (&outcome.component_id, outcome.deferred) {
                (Some(id), _) => println!("extracted {id}"),
                (None, true) => println!("deferred: {}", outcome.decision.reason),
                (None, false) => println!("skipped: {}", outcome.decision.reason),
            }
            if let Some(existing) = &outcome.decision.suggestion {
                println!("reuse {existing} instead");
            }
        }

        RecordSubcommand::RetryDeferred => {
            let mut run = run;
            let outcomes = llkb
                .retry_deferred(&mut run)
                .context("failed to retry deferred candidates")?;
            if json {
                return print_json(&outcomes);
            }
            if outcomes.is_empty() {
                println!("No deferred candidates.");
            }
            for o in &outcomes {
                match &o.component_id {
                    Some(id) => println!("extracted {id}"),
                    None => println!("still blocked: {}", o.decision.reason),
                }
            }
        }
    }
    Ok(())
}
