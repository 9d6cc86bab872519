//! storage-ops — scheduled sync and parity scrub orchestrator.
//!
//! # Usage
//!
//! ```text
//! storage-ops                                   # one orchestrator run
//! storage-ops scrub <directory> <database> <redundancy> <log_file> [--no-verify]
//! storage-ops sync <source> <destination>
//! storage-ops status [--json]
//! storage-ops seed
//! ```
//!
//! Exit status: 0 on success, benign skip or nothing due; 1 when an
//! operation failed; 130/143 when interrupted by SIGINT/SIGTERM.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{scrub::ScrubArgs, seed::SeedArgs, status::StatusArgs, sync::SyncArgs, Tools};
use storeops_core::RuntimePaths;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "storage-ops",
    version,
    about = "Mirror directory trees and keep them parity-protected",
    long_about = None,
)]
struct Cli {
    /// Re-root the config, state, lock and log locations.
    #[arg(long, env = "STORAGE_OPS_ROOT", global = true, hide = true)]
    root: Option<PathBuf>,

    /// Mirror tool executable (rsync-compatible).
    #[arg(long, env = "STORAGE_OPS_RSYNC", global = true, hide = true, default_value = "rsync")]
    rsync: PathBuf,

    /// Parity tool executable (par2-compatible).
    #[arg(long, env = "STORAGE_OPS_PAR2", global = true, hide = true, default_value = "par2")]
    par2: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, verify and repair parity for one directory tree.
    Scrub(ScrubArgs),

    /// Mirror one directory onto another.
    Sync(SyncArgs),

    /// Show every configured operation and when it is next due.
    Status(StatusArgs),

    /// Make unseeded scrub specs due on the next run.
    Seed(SeedArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let paths = match cli.root.as_deref() {
        Some(root) if !root.as_os_str().is_empty() => RuntimePaths::under(root),
        _ => RuntimePaths::system(),
    };
    let tools = Tools {
        rsync: cli.rsync,
        par2: cli.par2,
    };

    let code = match cli.command {
        None => commands::run::run(&paths, &tools)?,
        Some(Commands::Scrub(args)) => args.run(&paths, &tools)?,
        Some(Commands::Sync(args)) => args.run(&paths, &tools)?,
        Some(Commands::Status(args)) => args.run(&paths)?,
        Some(Commands::Seed(args)) => args.run(&paths)?,
    };
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
