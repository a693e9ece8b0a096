mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    action::ActionSubcommand, config::ConfigSubcommand, receipt::ReceiptSubcommand,
    tile::TileSubcommand, verb::VerbSubcommand, widget::WidgetSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "canvas",
    about = "Governed actions and widget layouts for a canvas workspace",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .canvas/ or .git/)
    #[arg(long, global = true, env = "CANVAS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .canvas/ with a default config and starter manifest
    Init,

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Look up tiles in the manifest
    Tile {
        #[command(subcommand)]
        subcommand: TileSubcommand,
    },

    /// Search the verbs tiles offer
    Verb {
        #[command(subcommand)]
        subcommand: VerbSubcommand,
    },

    /// Place, move and close widgets
    Widget {
        #[command(subcommand)]
        subcommand: WidgetSubcommand,
    },

    /// Submit governed actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Inspect recorded receipts
    Receipt {
        #[command(subcommand)]
        subcommand: ReceiptSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Tile { subcommand } => cmd::tile::run(&root, subcommand, cli.json),
        Commands::Verb { subcommand } => cmd::verb::run(&root, subcommand, cli.json),
        Commands::Widget { subcommand } => cmd::widget::run(&root, subcommand, cli.json),
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json),
        Commands::Receipt { subcommand } => cmd::receipt::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
