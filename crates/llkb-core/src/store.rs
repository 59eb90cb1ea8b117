//! File-backed collection store.
//!
//! Layout (relative to the LLKB root):
//!   lessons.json      : lessons, global rules, app quirks
//!   components.json   : extracted components and deferred candidates
//!   analytics.json    : derived snapshot, rebuilt by `analytics`
//!   archive.json      : archived lessons/components
//!   patterns/*.json   : curated pattern libraries
//!
//! Every read-modify-write goes through [`Store::update_with_lock`], which
//! serializes writers across processes with a sibling `<file>.lock` file.

use crate::config::LlkbConfig;
use crate::error::{LlkbError, Result};
use crate::history::HistoryLog;
use crate::types::{AppQuirk, Component, DeferredCandidate, GlobalRule, Lesson};
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const SCHEMA_VERSION: &str = "1.0.0";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// A JSON document owned by the store.
pub trait Collection: Serialize + DeserializeOwned + Default {
    /// File name relative to the LLKB root.
    const FILE: &'static str;

    /// Stamp the document before it is written by a locked update.
    fn touch(&mut self, _now: DateTime<Utc>) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonsFile {
    #[serde(default = "default_schema_version")]
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub global_rules: Vec<GlobalRule>,
    #[serde(default)]
    pub app_quirks: Vec<AppQuirk>,
}

impl Default for LessonsFile {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            last_updated: None,
            lessons: Vec::new(),
            global_rules: Vec::new(),
            app_quirks: Vec::new(),
        }
    }
}

impl Collection for LessonsFile {
    const FILE: &'static str = paths::LESSONS_FILE;

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
    }
}

impl LessonsFile {
    pub fn lesson(&self, id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }

    pub fn lesson_mut(&mut self, id: &str) -> Option<&mut Lesson> {
        self.lessons.iter_mut().find(|l| l.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsFile {
    #[serde(default = "default_schema_version")]
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub deferred: Vec<DeferredCandidate>,
}

impl Default for ComponentsFile {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            last_updated: None,
            components: Vec::new(),
            deferred: Vec::new(),
        }
    }
}

impl Collection for ComponentsFile {
    const FILE: &'static str = paths::COMPONENTS_FILE;

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
    }
}

impl ComponentsFile {
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn component_mut(&mut self, id: &str) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFile {
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Collection for ArchiveFile {
    const FILE: &'static str = paths::ARCHIVE_FILE;
}

// ---------------------------------------------------------------------------
// Pattern libraries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Selectors,
    Timing,
    Data,
    Auth,
    Assertions,
}

impl PatternKind {
    pub fn all() -> &'static [PatternKind] {
        &[
            PatternKind::Selectors,
            PatternKind::Timing,
            PatternKind::Data,
            PatternKind::Auth,
            PatternKind::Assertions,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Selectors => "selectors",
            PatternKind::Timing => "timing",
            PatternKind::Data => "data",
            PatternKind::Auth => "auth",
            PatternKind::Assertions => "assertions",
        }
    }

    fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEntry {
    pub id: String,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFile {
    #[serde(default = "default_schema_version")]
    pub version: String,
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
}

impl Default for PatternFile {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            patterns: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lock files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub timeout: Duration,
    /// Locks older than this are assumed abandoned and force-released.
    pub stale_after: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Held advisory lock. The lock file is removed on drop.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path, opts: &LockOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            io::ensure_dir(parent)?;
        }
        let started = Instant::now();
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut f) => {
                    f.write_all(Utc::now().to_rfc3339().as_bytes())?;
                    tracing::debug!(lock = %path.display(), "lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(path) {
                        if age > opts.stale_after {
                            tracing::warn!(
                                lock = %path.display(),
                                age_secs = age.as_secs(),
                                "force-releasing stale lock"
                            );
                            match std::fs::remove_file(path) {
                                Ok(()) => continue,
                                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    let waited = started.elapsed();
                    if waited >= opts.timeout {
                        return Err(LlkbError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(opts.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(lock = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}

/// Age of a lock file: the timestamp it contains, else its mtime.
fn lock_age(path: &Path) -> Option<Duration> {
    let written = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc));
    if let Some(ts) = written {
        return Some((Utc::now() - ts).to_std().unwrap_or(Duration::ZERO));
    }
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.elapsed().unwrap_or(Duration::ZERO))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    lock: LockOptions,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        self.root.join(paths::LESSONS_FILE).exists()
    }

    pub fn history(&self) -> HistoryLog {
        HistoryLog::new(paths::history_dir(&self.root))
    }

    pub fn config(&self) -> LlkbConfig {
        LlkbConfig::load(&self.root)
    }

    /// Load a collection; a missing file yields its empty default.
    pub fn load<C: Collection>(&self) -> Result<C> {
        load_json(&self.root.join(C::FILE))
    }

    /// Write a collection through a same-directory tempfile + rename.
    pub fn save_atomic<C: Collection>(&self, data: &C) -> Result<()> {
        save_json(&self.root.join(C::FILE), data)
    }

    /// Locked read-modify-write. When `update` fails nothing is written, and
    /// the lock is released on every path.
    pub fn update_with_lock<C, R>(&self, update: impl FnOnce(&mut C) -> Result<R>) -> Result<R>
    where
        C: Collection,
    {
        let path = self.root.join(C::FILE);
        let _lock = FileLock::acquire(&paths::lock_path(&path), &self.lock)?;
        let mut data: C = load_json(&path)?;
        let out = update(&mut data)?;
        data.touch(Utc::now());
        save_json(&path, &data)?;
        Ok(out)
    }

    pub fn load_patterns(&self, kind: PatternKind) -> Result<PatternFile> {
        load_json(&self.pattern_path(kind))
    }

    pub fn save_patterns(&self, kind: PatternKind, data: &PatternFile) -> Result<()> {
        save_json(&self.pattern_path(kind), data)
    }

    fn pattern_path(&self, kind: PatternKind) -> PathBuf {
        paths::patterns_dir(&self.root).join(kind.file_name())
    }

    /// Create the directory tree and any missing files. Existing files are
    /// left untouched. Returns the files that were created, relative to root.
    pub fn init(&self) -> Result<Vec<String>> {
        io::ensure_dir(&self.root)?;
        io::ensure_dir(&paths::patterns_dir(&self.root))?;
        io::ensure_dir(&paths::history_dir(&self.root))?;

        let mut created = Vec::new();
        let config = serde_yaml::to_string(&LlkbConfig::default())?;
        if io::write_if_missing(&paths::config_path(&self.root), config.as_bytes())? {
            created.push(paths::CONFIG_FILE.to_string());
        }
        self.init_collection::<LessonsFile>(&mut created)?;
        self.init_collection::<ComponentsFile>(&mut created)?;
        self.init_collection::<ArchiveFile>(&mut created)?;
        for &kind in PatternKind::all() {
            let data = serde_json::to_string_pretty(&PatternFile::default())?;
            if io::write_if_missing(&self.pattern_path(kind), data.as_bytes())? {
                created.push(format!("{}/{}", paths::PATTERNS_DIR, kind.file_name()));
            }
        }
        Ok(created)
    }

    fn init_collection<C: Collection>(&self, created: &mut Vec<String>) -> Result<()> {
        let data = serde_json::to_string_pretty(&C::default())?;
        if io::write_if_missing(&self.root.join(C::FILE), data.as_bytes())? {
            created.push(C::FILE.to_string());
        }
        Ok(())
    }

    /// Lock files currently present, with their age when it can be read.
    pub fn lock_files(&self) -> Result<Vec<(String, Option<Duration>)>> {
        let mut out = Vec::new();
        for dir in [self.root.clone(), paths::patterns_dir(&self.root)] {
            if !dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                let is_lock = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(paths::LOCK_SUFFIX));
                if is_lock {
                    let name = path
                        .strip_prefix(&self.root)
                        .unwrap_or(&path)
                        .display()
                        .to_string();
                    out.push((name, lock_age(&path)));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|source| LlkbError::CorruptData {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(data)?;
    json.push('\n');
    io::atomic_write(path, json.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
