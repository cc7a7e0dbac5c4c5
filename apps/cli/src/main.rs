//! Demo workload for the swapmem allocator
//!
//! `copy` pushes every pool through eviction by copying a directory of files
//! with randomly sized blocks across threads; `check` verifies the copies
//! byte for byte.

mod check;
mod copy;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swapmem", version, about = "Paged allocator demo workload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy every file in a directory through the allocator
    Copy(copy::CopyArgs),
    /// Compare the copies against the originals byte for byte
    Check(check::CheckArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .compact()
        .init();

    match Cli::parse().command {
        Command::Copy(args) => copy::run(&args),
        Command::Check(args) => check::run(&args),
    }
}
