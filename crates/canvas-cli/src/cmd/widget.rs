use crate::cmd::action::{govern, open_context, report};
use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use canvas_core::config::Config;
use canvas_core::telemetry::TracingSink;
use canvas_core::workspace::{
    DragOutcome, FileLayoutStore, Point, Position, Size, Widget, Workspace,
};
use clap::{Args, Subcommand};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_LAYOUT: &str = "main";

#[derive(Args)]
pub struct LayoutArg {
    /// Saved layout to operate on
    #[arg(long, default_value = DEFAULT_LAYOUT)]
    layout: String,
}

#[derive(Subcommand)]
pub enum WidgetSubcommand {
    /// Place a widget; without --x/--y it goes in the first free slot
    Add {
        id: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, requires = "y")]
        x: Option<i32>,
        #[arg(long, requires = "x")]
        y: Option<i32>,
        /// Grid cells per row when searching for a free slot
        #[arg(long, default_value_t = 40)]
        columns: u32,
        #[command(flatten)]
        layout: LayoutArg,
    },
    /// Drag a widget to a new top-left corner; the drop snaps to the grid
    Move {
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        #[command(flatten)]
        layout: LayoutArg,
    },
    /// Close a widget (a governed action that needs confirmation)
    Remove {
        id: String,
        /// Approve without asking when the removal is YELLOW
        #[arg(long, short = 'y')]
        yes: bool,
        #[command(flatten)]
        layout: LayoutArg,
    },
    /// List widgets in a layout
    List {
        #[command(flatten)]
        layout: LayoutArg,
    },
}

pub fn run(root: &Path, subcmd: WidgetSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WidgetSubcommand::Add {
            id,
            width,
            height,
            x,
            y,
            columns,
            layout,
        } => {
            let position = x.zip(y).map(|(x, y)| Position::new(x, y));
            add(root, &layout.layout, id, Size::new(width, height), position, columns, json)
        }
        WidgetSubcommand::Move { id, x, y, layout } => {
            drag(root, &layout.layout, &id, Point::new(x, y), json)
        }
        WidgetSubcommand::Remove { id, yes, layout } => remove(root, &layout.layout, &id, yes, json),
        WidgetSubcommand::List { layout } => list(root, &layout.layout, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load(root: &Path, key: &str) -> anyhow::Result<(Workspace, FileLayoutStore)> {
    let config = Config::load(root).context("failed to load config")?;
    let store = FileLayoutStore::new(root);
    let mut workspace = Workspace::from_settings(&config.workspace)
        .context("invalid workspace settings")?
        .with_telemetry(Arc::new(TracingSink));
    workspace
        .restore(&store, key)
        .with_context(|| format!("failed to load layout '{key}'"))?;
    Ok((workspace, store))
}

fn save(workspace: &Workspace, store: &FileLayoutStore, key: &str) -> anyhow::Result<()> {
    workspace
        .persist(store, key)
        .with_context(|| format!("failed to save layout '{key}'"))
}

// ---------------------------------------------------------------------------
// add / move / list
// ---------------------------------------------------------------------------

fn add(
    root: &Path,
    key: &str,
    id: String,
    size: Size,
    position: Option<Position>,
    columns: u32,
    json: bool,
) -> anyhow::Result<()> {
    let (mut workspace, store) = load(root, key)?;
    let position = position.unwrap_or_else(|| workspace.find_free_position(size, columns));
    let placed = workspace.add_widget(Widget::new(id, position, size))?;
    save(&workspace, &store, key)?;

    if json {
        print_json(&placed)?;
    } else {
        println!("Placed '{}' at {} ({})", placed.id, placed.position, placed.size);
    }
    Ok(())
}

fn drag(root: &Path, key: &str, id: &str, to: Point, json: bool) -> anyhow::Result<()> {
    let (mut workspace, store) = load(root, key)?;
    let grab: Point = workspace
        .widget(id)
        .map(|w| w.position.into())
        .with_context(|| format!("widget not found: {id}"))?;
    workspace.begin_drag(id, grab)?;
    workspace.update_drag(to);
    let outcome = workspace
        .end_drag()
        .context("drag ended without an outcome")?;

    if let DragOutcome::Committed { .. } = outcome {
        save(&workspace, &store, key)?;
    }
    if json {
        print_json(&outcome)?;
    }
    match outcome {
        DragOutcome::Committed { to, collided, .. } => {
            if !json {
                println!("Moved '{id}' to {to}");
            }
            if collided {
                eprintln!("warning: '{id}' now overlaps another widget");
            }
            Ok(())
        }
        DragOutcome::Reverted {
            position,
            attempted,
            ..
        } => bail!("'{id}' would overlap another widget at {attempted}; left at {position}"),
    }
}

fn list(root: &Path, key: &str, json: bool) -> anyhow::Result<()> {
    let (workspace, _) = load(root, key)?;
    if json {
        return print_json(&workspace.widgets());
    }
    if workspace.widgets().is_empty() {
        println!("No widgets in layout '{key}'.");
        return Ok(());
    }
    let rows = workspace
        .widgets()
        .iter()
        .map(|w| {
            vec![
                w.id.clone(),
                w.position.x.to_string(),
                w.position.y.to_string(),
                w.size.to_string(),
                w.z_index.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "X", "Y", "SIZE", "Z"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// remove (governed)
// ---------------------------------------------------------------------------

fn remove(root: &Path, key: &str, id: &str, yes: bool, json: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let ctx = open_context(root)?;
        let store = FileLayoutStore::new(root);
        ctx.workspace()
            .restore(&store, key)
            .with_context(|| format!("failed to load layout '{key}'"))?;
        let receipt = govern(&ctx, yes, |ctx| ctx.close_widget(id)).await?;
        if receipt.succeeded() {
            save(&ctx.workspace(), &store, key)?;
        }
        Ok::<_, anyhow::Error>(receipt)
    });
    runtime.shutdown_background();
    report(&result?, json)
}
