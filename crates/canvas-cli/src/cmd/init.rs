use crate::output::print_json;
use anyhow::Context;
use canvas_core::{config::Config, io, manifest::TileManifest, paths};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut created = Vec::new();

    for dir in [paths::CANVAS_DIR, paths::LAYOUTS_DIR] {
        let p = root.join(dir);
        std::fs::create_dir_all(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if io::write_yaml_if_missing(&paths::config_path(root), &Config::default())
        .context("failed to write config.yaml")?
    {
        created.push(paths::CONFIG_FILE);
    }

    if io::write_yaml_if_missing(&paths::manifest_path(root), &TileManifest::starter())
        .context("failed to write manifest.yaml")?
    {
        created.push(paths::MANIFEST_FILE);
    }

    // Receipts are per-machine history, not project content.
    io::ensure_gitignore_entry(root, paths::RECEIPTS_DB)?;

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
        }))?;
    } else {
        println!("Initialized canvas in {}", root.display());
        for path in [paths::CONFIG_FILE, paths::MANIFEST_FILE] {
            let verb = if created.contains(&path) { "created" } else { "exists " };
            println!("  {verb}: {path}");
        }
    }
    Ok(())
}
