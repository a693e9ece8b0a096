//! Saving and restoring widget layouts.

use super::Widget;
use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key-value persistence for layouts. `load` returns `None` for a key that
/// was never saved.
pub trait LayoutStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<Widget>>>;
    fn save(&self, key: &str, widgets: &[Widget]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    widgets: Vec<Widget>,
}

fn default_version() -> u32 {
    1
}

/// One YAML file per key under `.canvas/layouts/`.
#[derive(Debug, Clone)]
pub struct FileLayoutStore {
    root: PathBuf,
}

impl FileLayoutStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys with a saved layout, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let dir = paths::layouts_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl LayoutStore for FileLayoutStore {
    fn load(&self, key: &str) -> Result<Option<Vec<Widget>>> {
        paths::validate_key(key)?;
        let file: Option<LayoutFile> = io::read_yaml(&paths::layout_path(&self.root, key))?;
        Ok(file.map(|f| f.widgets))
    }

    fn save(&self, key: &str, widgets: &[Widget]) -> Result<()> {
        paths::validate_key(key)?;
        let file = LayoutFile {
            version: default_version(),
            widgets: widgets.to_vec(),
        };
        io::write_yaml(&paths::layout_path(&self.root, key), &file)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    layouts: Mutex<HashMap<String, Vec<Widget>>>,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayoutStore for MemoryLayoutStore {
    fn load(&self, key: &str) -> Result<Option<Vec<Widget>>> {
        Ok(self
            .layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, widgets: &[Widget]) -> Result<()> {
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), widgets.to_vec());
        Ok(())
    }
}
