//! File helpers shared by config, manifest and layout persistence. Every
//! write goes through a sibling tempfile and a rename, so readers never see
//! a half-written file.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Parse a YAML file. A missing file is `None`, not an error.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_yaml::from_str(&text)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    atomic_write(path, serde_yaml::to_string(value)?.as_bytes())
}

/// Write `value` unless `path` already exists. Returns whether it wrote.
pub fn write_yaml_if_missing<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_yaml(path, value)?;
    Ok(true)
}

/// Make sure `root/.gitignore` has a line equal to `entry`.
pub fn ensure_gitignore_entry(root: &Path, entry: &str) -> Result<()> {
    let path = root.join(".gitignore");
    let mut content = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if content.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(entry);
    content.push('\n');
    atomic_write(&path, content.as_bytes())
}
