//! agentsync: keep agent and tool configuration in Git in step with the
//! Orchestrate service.
//!
//! # Usage
//!
//! ```text
//! agentsync [--root DIR] [--verbose] import --kind agents|tools|all [--env NAME] [--api-key KEY]
//! agentsync [--root DIR] [--verbose] export --kind agents|tools|all [--env NAME] [--deploy]
//! agentsync diff --direction import|export [--kind ...] [--env NAME]
//! agentsync status [--env NAME] [--json]
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs,
    status::StatusArgs,
    sync::{ExportArgs, ImportArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "agentsync",
    version,
    about = "Synchronize agent and tool definitions with the Orchestrate service",
    long_about = None,
)]
struct Cli {
    /// Project root holding the agents/ and tools/ folders.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull remote agents and tools into the local tree.
    Import(ImportArgs),

    /// Push local agents and tools to the remote service.
    Export(ExportArgs),

    /// Show unified diffs of what an import or export would write.
    Diff(DiffArgs),

    /// Compare the local tree with the last recorded sync, offline.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let root = cli.root;
    match cli.command {
        Commands::Import(args) => args.run(&root),
        Commands::Export(args) => args.run(&root),
        Commands::Diff(args) => args.run(&root),
        Commands::Status(args) => args.run(&root),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
