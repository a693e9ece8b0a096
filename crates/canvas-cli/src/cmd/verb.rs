use crate::output::print_json;
use anyhow::Context;
use canvas_core::manifest::TileManifest;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum VerbSubcommand {
    /// Case-insensitive search over verb labels, grouped by tile
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
}

pub fn run(root: &Path, subcmd: VerbSubcommand, json: bool) -> anyhow::Result<()> {
    let manifest = TileManifest::load(root).context("failed to load manifest")?;
    match subcmd {
        VerbSubcommand::Search { query } => search(&manifest, &query.join(" "), json),
    }
}

fn search(manifest: &TileManifest, query: &str, json: bool) -> anyhow::Result<()> {
    let hits = manifest.search_verbs(query);
    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No verbs match '{query}'.");
        return Ok(());
    }
    for (tile, verbs) in TileManifest::group_by_tile(&hits) {
        println!("{} ({})", tile.label, tile.id);
        for verb in verbs {
            println!("  {:<16} {:<20} {}", verb.action, verb.label, verb.risk_tier);
        }
    }
    Ok(())
}
