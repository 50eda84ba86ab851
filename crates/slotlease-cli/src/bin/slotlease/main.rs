//! slotlease - bounded-concurrency leases from the shell.
//!
//! Coordinates processes on one host (or on a shared filesystem) through a
//! directory of lease files. Each target gets `--limit` slots; a command run
//! under `slotlease run` holds one slot for its whole lifetime.
//!
//! # Usage
//!
//! ```bash
//! # At most two concurrent uploads
//! slotlease --limit 2 run uploads -- ./upload.sh big.tar
//!
//! # Give up after 30 seconds of waiting
//! slotlease --deadline 30000 run printer -- lp report.pdf
//!
//! # Manual lease management for scripts
//! TOKEN=$(slotlease --json acquire printer | jq -r .token)
//! slotlease renew printer "$TOKEN"
//! slotlease release printer "$TOKEN"
//!
//! # Inspect slots
//! slotlease --limit 2 status uploads
//! ```
//!
//! # Tiger Style
//!
//! - Explicit error handling with anyhow
//! - Distinct exit code (75) when no slot could be acquired
//! - The child's exit code is propagated unchanged

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output (for scripting)
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    let code = cli.run().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
