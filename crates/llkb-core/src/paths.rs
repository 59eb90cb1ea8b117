use chrono::NaiveDate;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Layout constants (relative to the LLKB root)
// ---------------------------------------------------------------------------

/// Default location of the knowledge base inside a project.
pub const DEFAULT_ROOT: &str = ".artk/llkb";

pub const CONFIG_FILE: &str = "config.yml";
pub const LESSONS_FILE: &str = "lessons.json";
pub const COMPONENTS_FILE: &str = "components.json";
pub const ANALYTICS_FILE: &str = "analytics.json";
pub const ARCHIVE_FILE: &str = "archive.json";

pub const PATTERNS_DIR: &str = "patterns";
pub const HISTORY_DIR: &str = "history";

pub const LOCK_SUFFIX: &str = ".lock";
pub const HISTORY_EXT: &str = "jsonl";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn patterns_dir(root: &Path) -> PathBuf {
    root.join(PATTERNS_DIR)
}

pub fn history_dir(root: &Path) -> PathBuf {
    root.join(HISTORY_DIR)
}

/// `<YYYY-MM-DD>.jsonl`
pub fn partition_file_name(date: NaiveDate) -> String {
    format!("{}.{HISTORY_EXT}", date.format("%Y-%m-%d"))
}

/// `<root>/history/<YYYY-MM-DD>.jsonl`
pub fn history_partition(root: &Path, date: NaiveDate) -> PathBuf {
    history_dir(root).join(partition_file_name(date))
}

/// Sibling lock file for a collection: `lessons.json` → `lessons.json.lock`.
pub fn lock_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Parse the date out of a history partition file name, if it is one.
pub fn partition_date(path: &Path) -> Option<NaiveDate> {
    if path.extension()?.to_str()? != HISTORY_EXT {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj/.artk/llkb");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.artk/llkb/config.yml")
        );
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            history_partition(root, date),
            PathBuf::from("/tmp/proj/.artk/llkb/history/2026-03-09.jsonl")
        );
    }

    #[test]
    fn lock_path_is_sibling() {
        let p = Path::new("/data/lessons.json");
        assert_eq!(lock_path(p), PathBuf::from("/data/lessons.json.lock"));
    }

    #[test]
    fn partition_date_parsing() {
        let date = partition_date(Path::new("history/2026-01-31.jsonl"));
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 31));
        assert!(partition_date(Path::new("history/notes.jsonl")).is_none());
        assert!(partition_date(Path::new("history/2026-01-31.json")).is_none());
    }
}
