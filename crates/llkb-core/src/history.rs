//! Append-only, date-partitioned event log.
//!
//! Layout:
//!   history/<YYYY-MM-DD>.jsonl : one JSON event per line, UTC dates
//!
//! Appends take no lock: each event is a single `write_all` of one complete
//! line on an append-mode handle, which is safe on local filesystems. History
//! is an audit trail, so [`HistoryLog::append`] logs failures and carries on.

use crate::error::{LlkbError, Result};
use crate::{io, paths};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    LessonCreated {
        lesson_id: String,
    },
    LessonApplied {
        lesson_id: String,
        success: bool,
    },
    ComponentExtracted {
        component_id: String,
        predictive: bool,
    },
    ComponentUsed {
        component_id: String,
        success: bool,
    },
    QuirkDiscovered {
        quirk_id: String,
    },
    MetricsUpdated {
        lessons: usize,
        components: usize,
    },
    PatternOverridden {
        entity_id: String,
        overrides: u32,
        flagged: bool,
    },
    EntityArchived {
        entity_id: String,
        reason: String,
    },
    ExtractionDeferred {
        name: String,
        reason: String,
    },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LessonCreated { .. } => "lesson_created",
            EventKind::LessonApplied { .. } => "lesson_applied",
            EventKind::ComponentExtracted { .. } => "component_extracted",
            EventKind::ComponentUsed { .. } => "component_used",
            EventKind::QuirkDiscovered { .. } => "quirk_discovered",
            EventKind::MetricsUpdated { .. } => "metrics_updated",
            EventKind::PatternOverridden { .. } => "pattern_overridden",
            EventKind::EntityArchived { .. } => "entity_archived",
            EventKind::ExtractionDeferred { .. } => "extraction_deferred",
        }
    }

    /// Id of the lesson/component/quirk the event is about, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            EventKind::LessonCreated { lesson_id } | EventKind::LessonApplied { lesson_id, .. } => {
                Some(lesson_id)
            }
            EventKind::ComponentExtracted { component_id, .. }
            | EventKind::ComponentUsed { component_id, .. } => Some(component_id),
            EventKind::QuirkDiscovered { quirk_id } => Some(quirk_id),
            EventKind::PatternOverridden { entity_id, .. }
            | EventKind::EntityArchived { entity_id, .. } => Some(entity_id),
            EventKind::MetricsUpdated { .. } | EventKind::ExtractionDeferred { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
    pub run_id: String,
    pub tool: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl HistoryEvent {
    pub fn new(
        kind: EventKind,
        run_id: impl Into<String>,
        tool: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            run_id: run_id.into(),
            tool: tool.into(),
            summary: summary.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Result of reading one partition.
#[derive(Debug, Default)]
pub struct PartitionScan {
    pub events: Vec<HistoryEvent>,
    pub malformed: usize,
}

// ---------------------------------------------------------------------------
// HistoryLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn partition(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(paths::partition_file_name(date))
    }

    /// Append an event to its day's partition.
    pub fn try_append(&self, event: &HistoryEvent) -> Result<()> {
        let path = self.partition(event.timestamp.date_naive());
        let line = serde_json::to_string(event)?;
        io::ensure_dir(&self.dir)
            .and_then(|_| io::append_line(&path, &line).map_err(LlkbError::from))
            .map_err(|e| match e {
                LlkbError::Io(source) => LlkbError::HistoryWrite { path, source },
                other => other,
            })
    }

    /// Best-effort append: failures are logged, never returned.
    pub fn append(&self, event: &HistoryEvent) {
        if let Err(e) = self.try_append(event) {
            tracing::warn!(
                event = event.kind.as_str(),
                error = %e,
                "failed to write history event"
            );
        }
    }

    /// Read a day's partition, skipping malformed lines.
    pub fn scan(&self, date: NaiveDate) -> Result<PartitionScan> {
        scan_file(&self.partition(date))
    }

    pub fn events_on(&self, date: NaiveDate) -> Result<Vec<HistoryEvent>> {
        Ok(self.scan(date)?.events)
    }

    pub fn count_events_on(&self, date: NaiveDate, pred: impl Fn(&HistoryEvent) -> bool) -> usize {
        match self.scan(date) {
            Ok(scan) => scan.events.iter().filter(|e| pred(e)).count(),
            Err(e) => {
                tracing::warn!(%date, error = %e, "failed to read history partition");
                0
            }
        }
    }

    pub fn count_events_today(&self, pred: impl Fn(&HistoryEvent) -> bool) -> usize {
        self.count_events_on(Utc::now().date_naive(), pred)
    }

    /// All partitions on disk, oldest first. Files that are not
    /// `<YYYY-MM-DD>.jsonl` are ignored.
    pub fn partitions(&self) -> Result<Vec<NaiveDate>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            if let Some(date) = paths::partition_date(&entry?.path()) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Partitions strictly older than `retention_days` before `today`.
    /// Today's partition is never expired.
    pub fn expired_partitions(&self, retention_days: i64, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let cutoff = TimeDelta::try_days(retention_days)
            .filter(|_| retention_days >= 1)
            .and_then(|span| today.checked_sub_signed(span))
            .ok_or_else(|| {
                LlkbError::ConfigInvalid(format!(
                    "retention.historyRetentionDays out of range: {retention_days}"
                ))
            })?;
        Ok(self
            .partitions()?
            .into_iter()
            .filter(|d| *d < cutoff)
            .collect())
    }

    /// Delete expired partitions. Returns the dates removed.
    pub fn prune(&self, retention_days: i64, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let expired = self.expired_partitions(retention_days, today)?;
        for date in &expired {
            std::fs::remove_file(self.partition(*date))?;
            tracing::debug!(%date, "pruned history partition");
        }
        Ok(expired)
    }
}

fn scan_file(path: &Path) -> Result<PartitionScan> {
    let mut scan = PartitionScan::default();
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(scan),
        Err(e) => return Err(e.into()),
    };
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEvent>(&line) {
            Ok(event) => scan.events.push(event),
            Err(_) => scan.malformed += 1,
        }
    }
    Ok(scan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extracted(id: &str) -> HistoryEvent {
        HistoryEvent::new(
            EventKind::ComponentExtracted {
                component_id: id.to_string(),
                predictive: true,
            },
            "run-1",
            "journey-implement",
            format!("extracted {id}"),
        )
    }

    #[test]
    fn event_json_shape() {
        let event = HistoryEvent::new(
            EventKind::LessonApplied {
                lesson_id: "L001".to_string(),
                success: true,
            },
            "run-9",
            "journey-verify",
            "applied L001",
        );
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "lesson_applied");
        assert_eq!(value["lessonId"], "L001");
        assert_eq!(value["runId"], "run-9");
        assert!(value.get("metadata").is_none());

        let back: HistoryEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind.entity_id(), Some("L001"));
    }

    #[test]
    fn append_creates_partition_and_counts() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path().join("history"));
        for i in 0..3 {
            log.try_append(&extracted(&format!("COMP00{i}"))).unwrap();
        }
        log.try_append(&HistoryEvent::new(
            EventKind::QuirkDiscovered {
                quirk_id: "AQ001".to_string(),
            },
            "run-1",
            "journey-verify",
            "quirk",
        ))
        .unwrap();

        let today = Utc::now().date_naive();
        assert!(dir.path().join("history").join(paths::partition_file_name(today)).exists());
        let n = log.count_events_today(|e| matches!(e.kind, EventKind::ComponentExtracted { .. }));
        assert_eq!(n, 3);
        assert_eq!(log.events_on(today).unwrap().len(), 4);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        let today = Utc::now().date_naive();
        log.try_append(&extracted("COMP001")).unwrap();
        io::append_line(&dir.path().join(paths::partition_file_name(today)), "{not json").unwrap();
        log.try_append(&extracted("COMP002")).unwrap();

        let scan = log.scan(today).unwrap();
        assert_eq!(scan.events.len(), 2);
        assert_eq!(scan.malformed, 1);
        assert_eq!(log.count_events_today(|_| true), 2);
    }

    #[test]
    fn events_go_to_their_own_day() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        let old = DateTime::parse_from_rfc3339("2025-06-01T23:59:00Z")
            .unwrap()
            .with_timezone(&Utc);
        log.try_append(&extracted("COMP001").at(old)).unwrap();
        assert!(dir.path().join("2025-06-01.jsonl").exists());
        assert_eq!(log.count_events_today(|_| true), 0);
    }

    #[test]
    fn append_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        // A regular file where the history directory should be.
        let blocker = dir.path().join("history");
        std::fs::write(&blocker, "not a dir").unwrap();
        let log = HistoryLog::new(&blocker);
        assert!(matches!(
            log.try_append(&extracted("COMP001")),
            Err(LlkbError::HistoryWrite { .. })
        ));
        log.append(&extracted("COMP001"));
    }

    #[test]
    fn prune_removes_only_expired_partitions() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        for name in ["2026-01-01.jsonl", "2026-03-01.jsonl", "2026-03-20.jsonl", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();

        let expired = log.expired_partitions(30, today).unwrap();
        assert_eq!(expired, vec![NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()]);

        let removed = log.prune(30, today).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!dir.path().join("2026-01-01.jsonl").exists());
        assert!(dir.path().join("2026-03-01.jsonl").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(log.partitions().unwrap().len(), 2);
    }

    #[test]
    fn out_of_range_retention_is_an_error() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::new(dir.path());
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        std::fs::write(dir.path().join("2026-03-31.jsonl"), "").unwrap();

        for days in [-1, 0, 9_000_000_000_000, i64::MAX] {
            let err = log.prune(days, today).unwrap_err();
            assert!(matches!(err, LlkbError::ConfigInvalid(_)), "{days}");
        }
        assert!(dir.path().join("2026-03-31.jsonl").exists());
    }
}
