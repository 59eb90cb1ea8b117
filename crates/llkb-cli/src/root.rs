use llkb_core::paths::DEFAULT_ROOT;
use std::path::{Path, PathBuf};

/// Resolve the LLKB root directory.
///
/// Priority:
/// 1. `--root` flag / `LLKB_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for an existing `.artk/llkb/`
/// 3. Fall back to `cwd/.artk/llkb`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd)
}

fn find_root_from(start: &Path) -> PathBuf {
    start
        .ancestors()
        .map(|dir| dir.join(DEFAULT_ROOT))
        .find(|candidate| candidate.is_dir())
        .unwrap_or_else(|| start.join(DEFAULT_ROOT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_existing_root_above_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(DEFAULT_ROOT)).unwrap();
        let subdir = dir.path().join("tests/e2e");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_root_from(&subdir), dir.path().join(DEFAULT_ROOT));
    }

    #[test]
    fn defaults_under_start_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_root_from(dir.path()), dir.path().join(DEFAULT_ROOT));
    }
}
