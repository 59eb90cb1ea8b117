//! Integrity checks over an LLKB root.

use crate::analytics::AnalyticsSnapshot;
use crate::config::{LlkbConfig, WarnLevel};
use crate::store::{ArchiveFile, Collection, ComponentsFile, LessonsFile, PatternKind, Store};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl HealthCheck {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }

    fn ok(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, detail)
    }

    fn warn(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, detail)
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, detail)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn warnings(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .count()
    }
}

pub fn check(root: &Path) -> HealthReport {
    let mut report = HealthReport::default();
    if !root.is_dir() {
        report.checks.push(HealthCheck::fail(
            "root",
            format!("{} does not exist; run 'llkb init'", root.display()),
        ));
        return report;
    }
    report
        .checks
        .push(HealthCheck::ok("root", root.display().to_string()));

    let store = Store::open(root);
    report.checks.push(check_config(root));

    let lessons = check_collection::<LessonsFile>(&store, &mut report);
    let components = check_collection::<ComponentsFile>(&store, &mut report);
    let archive = check_collection::<ArchiveFile>(&store, &mut report);
    check_collection::<AnalyticsSnapshot>(&store, &mut report);

    if let (Some(lessons), Some(components)) = (&lessons, &components) {
        report
            .checks
            .push(check_ids(lessons, components, archive.as_ref()));
        report.checks.push(check_metrics(lessons, components));
    }

    report.checks.push(check_patterns(&store));
    report.checks.push(check_history(&store));
    report.checks.push(check_locks(&store));
    report
}

fn check_config(root: &Path) -> HealthCheck {
    let config = match LlkbConfig::try_load(root) {
        Ok(c) => c,
        Err(e) => return HealthCheck::fail("config", e.to_string()),
    };
    let warnings = config.validate();
    if warnings.is_empty() {
        return HealthCheck::ok("config", "valid");
    }
    let detail = warnings
        .iter()
        .map(|w| w.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        HealthCheck::fail("config", detail)
    } else {
        HealthCheck::warn("config", detail)
    }
}

fn check_collection<C: Collection>(store: &Store, report: &mut HealthReport) -> Option<C> {
    match store.load::<C>() {
        Ok(data) => {
            report.checks.push(HealthCheck::ok(C::FILE, "parses"));
            Some(data)
        }
        Err(e) => {
            report.checks.push(HealthCheck::fail(C::FILE, e.to_string()));
            None
        }
    }
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dups: Vec<&str> = ids.filter(|id| !seen.insert(*id)).collect();
    dups.sort_unstable();
    dups.dedup();
    dups
}

fn check_ids(
    lessons: &LessonsFile,
    components: &ComponentsFile,
    archive: Option<&ArchiveFile>,
) -> HealthCheck {
    let archived_lessons = archive.map(|a| a.lessons.as_slice()).unwrap_or_default();
    let archived_components = archive.map(|a| a.components.as_slice()).unwrap_or_default();

    let mut dups = duplicates(
        lessons
            .lessons
            .iter()
            .chain(archived_lessons)
            .map(|l| l.id.as_str()),
    );
    dups.extend(duplicates(
        components
            .components
            .iter()
            .chain(archived_components)
            .map(|c| c.id.as_str()),
    ));
    dups.extend(duplicates(lessons.app_quirks.iter().map(|q| q.id.as_str())));
    dups.extend(duplicates(lessons.global_rules.iter().map(|r| r.id.as_str())));

    if dups.is_empty() {
        HealthCheck::ok("ids", "unique")
    } else {
        HealthCheck::fail("ids", format!("duplicate ids: {}", dups.join(", ")))
    }
}

fn in_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn check_metrics(lessons: &LessonsFile, components: &ComponentsFile) -> HealthCheck {
    let mut problems = Vec::new();
    for l in &lessons.lessons {
        let m = &l.metrics;
        if !in_unit(m.confidence) {
            problems.push(format!("{}: confidence {} out of range", l.id, m.confidence));
        }
        if !in_unit(m.success_rate) {
            problems.push(format!("{}: success rate {} out of range", l.id, m.success_rate));
        }
        if m.successes > m.occurrences {
            problems.push(format!(
                "{}: {} successes exceed {} occurrences",
                l.id, m.successes, m.occurrences
            ));
        }
    }
    for c in &components.components {
        let m = &c.metrics;
        if !in_unit(m.confidence) {
            problems.push(format!("{}: confidence {} out of range", c.id, m.confidence));
        }
        if !in_unit(m.success_rate) {
            problems.push(format!("{}: success rate {} out of range", c.id, m.success_rate));
        }
        if m.successes > m.total_uses {
            problems.push(format!(
                "{}: {} successes exceed {} uses",
                c.id, m.successes, m.total_uses
            ));
        }
    }
    if problems.is_empty() {
        HealthCheck::ok("metrics", "within bounds")
    } else {
        HealthCheck::fail("metrics", problems.join("; "))
    }
}

fn check_patterns(store: &Store) -> HealthCheck {
    let broken: Vec<String> = PatternKind::all()
        .iter()
        .filter_map(|&kind| {
            store
                .load_patterns(kind)
                .err()
                .map(|e| format!("{}: {e}", kind.as_str()))
        })
        .collect();
    if broken.is_empty() {
        HealthCheck::ok("patterns", "parse")
    } else {
        HealthCheck::fail("patterns", broken.join("; "))
    }
}

fn check_history(store: &Store) -> HealthCheck {
    let log = store.history();
    let partitions = match log.partitions() {
        Ok(p) => p,
        Err(e) => return HealthCheck::fail("history", e.to_string()),
    };
    let mut malformed = Vec::new();
    for date in &partitions {
        match log.scan(*date) {
            Ok(scan) if scan.malformed > 0 => {
                malformed.push(format!("{date}: {} malformed lines", scan.malformed))
            }
            Ok(_) => {}
            Err(e) => return HealthCheck::fail("history", format!("{date}: {e}")),
        }
    }
    if malformed.is_empty() {
        HealthCheck::ok("history", format!("{} partitions", partitions.len()))
    } else {
        HealthCheck::warn("history", malformed.join("; "))
    }
}

fn check_locks(store: &Store) -> HealthCheck {
    let locks = match store.lock_files() {
        Ok(l) => l,
        Err(e) => return HealthCheck::fail("locks", e.to_string()),
    };
    let stale_after = store.lock_options().stale_after;
    let stale: Vec<String> = locks
        .into_iter()
        .filter(|(_, age)| age.map_or(true, |a| a > stale_after))
        .map(|(name, _)| name)
        .collect();
    if stale.is_empty() {
        HealthCheck::ok("locks", "no stale locks")
    } else {
        HealthCheck::warn("locks", format!("stale lock files: {}", stale.join(", ")))
    }
}
