use crate::output::{print_json, print_table};
use anyhow::Context;
use canvas_core::manifest::TileManifest;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum TileSubcommand {
    /// Show a tile and the verbs it offers
    Show { tile_id: String },

    /// List every tile in the manifest
    List,
}

pub fn run(root: &Path, subcmd: TileSubcommand, json: bool) -> anyhow::Result<()> {
    let manifest = TileManifest::load(root).context("failed to load manifest")?;
    match subcmd {
        TileSubcommand::Show { tile_id } => show(&manifest, &tile_id, json),
        TileSubcommand::List => list(&manifest, json),
    }
}

fn show(manifest: &TileManifest, tile_id: &str, json: bool) -> anyhow::Result<()> {
    let tile = manifest.get_tile(tile_id);
    if json {
        return print_json(&tile);
    }
    // Unknown tiles simply offer nothing.
    let Some(tile) = tile else {
        println!("No verbs available for '{tile_id}'.");
        return Ok(());
    };
    println!("{} ({})", tile.label, tile.id);
    let rows = tile
        .verbs
        .iter()
        .map(|v| {
            vec![
                v.action.clone(),
                v.label.clone(),
                v.risk_tier.to_string(),
                v.fields.join(", "),
            ]
        })
        .collect();
    print_table(&["ACTION", "LABEL", "TIER", "FIELDS"], rows);
    Ok(())
}

fn list(manifest: &TileManifest, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&manifest.tiles);
    }
    if manifest.tiles.is_empty() {
        println!("No tiles.");
        return Ok(());
    }
    let rows = manifest
        .tiles
        .iter()
        .map(|t| vec![t.id.clone(), t.label.clone(), t.verbs.len().to_string()])
        .collect();
    print_table(&["TILE", "LABEL", "VERBS"], rows);
    Ok(())
}
