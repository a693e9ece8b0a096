use canvas_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the workspace root.
///
/// Priority:
/// 1. `--root` flag / `CANVAS_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` containing `.canvas/`
/// 3. Nearest ancestor of `cwd` containing `.git/`
/// 4. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_ancestor_with(&cwd, paths::CANVAS_DIR)
        .or_else(|| find_ancestor_with(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_ancestor_with(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}
