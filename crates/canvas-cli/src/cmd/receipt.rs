use crate::output::{print_json, print_receipt, print_table, receipt_row};
use anyhow::Context;
use canvas_core::paths;
use canvas_core::receipt::{ReceiptDb, ReceiptStore};
use canvas_core::types::RunwayState;
use clap::Subcommand;
use std::path::Path;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ReceiptSubcommand {
    /// List receipts, oldest first
    List {
        /// Only receipts with this final status (e.g. CANCELLED)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one receipt
    Show { action_id: String },
}

pub fn run(root: &Path, subcmd: ReceiptSubcommand, json: bool) -> anyhow::Result<()> {
    if !paths::canvas_dir(root).is_dir() {
        anyhow::bail!("not initialized: run 'canvas init'");
    }
    let db = ReceiptDb::open(&paths::receipts_db_path(root)).context("failed to open receipts")?;
    match subcmd {
        ReceiptSubcommand::List { status } => list(&db, status.as_deref(), json),
        ReceiptSubcommand::Show { action_id } => show(&db, &action_id, json),
    }
}

fn list(db: &ReceiptDb, status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let status = status.map(str::parse::<RunwayState>).transpose()?;
    let receipts: Vec<_> = db
        .list()?
        .into_iter()
        .filter(|r| status.map_or(true, |s| r.final_status == s))
        .collect();

    if json {
        return print_json(&receipts);
    }
    if receipts.is_empty() {
        println!("No receipts.");
        return Ok(());
    }
    print_table(
        &["ACTION", "TYPE", "STATUS", "COMPLETED"],
        receipts.iter().map(receipt_row).collect(),
    );
    Ok(())
}

fn show(db: &ReceiptDb, action_id: &str, json: bool) -> anyhow::Result<()> {
    let id: Uuid = action_id
        .parse()
        .with_context(|| format!("invalid action id: {action_id}"))?;
    let receipt = db
        .get(id)?
        .with_context(|| format!("no receipt for action {id}"))?;
    if json {
        print_json(&receipt)
    } else {
        print_receipt(&receipt);
        Ok(())
    }
}
