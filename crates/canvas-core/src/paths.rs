use crate::error::{CanvasError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CANVAS_DIR: &str = ".canvas";
pub const LAYOUTS_DIR: &str = ".canvas/layouts";

pub const CONFIG_FILE: &str = ".canvas/config.yaml";
pub const MANIFEST_FILE: &str = ".canvas/manifest.yaml";
pub const RECEIPTS_DB: &str = ".canvas/receipts.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn canvas_dir(root: &Path) -> PathBuf {
    root.join(CANVAS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

pub fn receipts_db_path(root: &Path) -> PathBuf {
    root.join(RECEIPTS_DB)
}

pub fn layouts_dir(root: &Path) -> PathBuf {
    root.join(LAYOUTS_DIR)
}

pub fn layout_path(root: &Path, key: &str) -> PathBuf {
    layouts_dir(root).join(format!("{key}.yaml"))
}

// ---------------------------------------------------------------------------
// Key validation
// ---------------------------------------------------------------------------

static KEY_RE: OnceLock<Regex> = OnceLock::new();

fn key_re() -> &'static Regex {
    KEY_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex is valid")
    })
}

/// Layout and widget keys double as file names, so they are restricted to
/// lowercase slugs.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 64 || !key_re().is_match(key) {
        return Err(CanvasError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        for key in ["default", "a", "sales-board-2", "x1"] {
            validate_key(key).unwrap_or_else(|_| panic!("expected valid: {key}"));
        }
    }

    #[test]
    fn invalid_keys() {
        for key in ["", "-lead", "trail-", "has space", "UPPER", "a_b", "../up"] {
            assert!(validate_key(key).is_err(), "expected invalid: {key}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.canvas/config.yaml")
        );
        assert_eq!(
            layout_path(root, "default"),
            PathBuf::from("/tmp/proj/.canvas/layouts/default.yaml")
        );
        assert_eq!(
            receipts_db_path(root),
            PathBuf::from("/tmp/proj/.canvas/receipts.redb")
        );
    }
}
