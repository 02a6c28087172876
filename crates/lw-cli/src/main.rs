//! CLI frontend for Loreweave story sessions.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lw",
    about = "Loreweave: compile, check and play interactive stories",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a story and report diagnostics
    Check {
        /// Story source file
        file: PathBuf,
    },

    /// Compile a story to its JSON form
    Compile {
        /// Story source file
        file: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write indented JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Play a story interactively
    Play {
        /// Story source, or a compiled `.json` story
        file: PathBuf,

        /// Keep this tag key across turns (repeatable; IMAGE is kept by default)
        #[arg(long = "retain", value_name = "KEY")]
        retain: Vec<String>,

        /// Do not keep IMAGE across turns
        #[arg(long)]
        no_retain: bool,

        /// Show this variable after every turn (repeatable)
        #[arg(short, long = "watch", value_name = "VAR")]
        watch: Vec<String>,

        /// Write save files as single-line JSON
        #[arg(long)]
        compact_saves: bool,
    },
}

/// Install the stderr log subscriber, filtered by `LW_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("LW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> miette::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => commands::check::run(&file),
        Commands::Compile {
            file,
            output,
            pretty,
        } => commands::compile::run(&file, output.as_deref(), pretty),
        Commands::Play {
            file,
            retain,
            no_retain,
            watch,
            compact_saves,
        } => {
            let options = commands::play::PlayOptions {
                retain,
                no_retain,
                watch,
                compact_saves,
            };
            commands::play::run(&file, &options)
        }
    }
}
