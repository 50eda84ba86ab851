//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with
//! support for environment variables and global options. Options given on
//! the command line override `SLOTLEASE_*` environment configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use slotlease::LeaseConfig;
use slotlease::LeaseManager;
use slotlease_store::FileLeaseStore;
use tracing::debug;

use crate::commands::lease::AcquireArgs;
use crate::commands::lease::ReleaseArgs;
use crate::commands::lease::RenewArgs;
use crate::commands::lease::StatusArgs;
use crate::commands::run::RunArgs;

/// Manager type shared by all commands.
pub type FileLeaseManager = LeaseManager<FileLeaseStore>;

/// Command-line interface for slotlease.
#[derive(Parser)]
#[command(name = "slotlease")]
#[command(version)]
#[command(about = "Bounded-concurrency leases over a shared lease directory")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Directory holding lease files.
    ///
    /// Every participant must use the same directory. Defaults to
    /// `slotlease` under the system temp directory.
    #[arg(long = "dir", env = "SLOTLEASE_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Slots per target. Must match across all participants.
    #[arg(long = "limit", global = true)]
    pub limit: Option<u32>,

    /// Lease time-to-live in milliseconds.
    #[arg(long = "ttl", global = true)]
    pub ttl_ms: Option<u64>,

    /// Sleep between acquire attempts in milliseconds (`run` only).
    #[arg(long = "backoff", global = true)]
    pub backoff_ms: Option<u64>,

    /// Give up acquiring after this many milliseconds (`run` only).
    ///
    /// `none` or `inf` waits forever.
    #[arg(long = "deadline", global = true)]
    pub deadline: Option<String>,

    /// Client id recorded in leases. Defaults to `<host>-<pid>`.
    #[arg(long = "client", global = true)]
    pub client: Option<String>,

    /// Output JSON instead of human-readable format.
    #[arg(long = "json", global = true)]
    pub is_json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging output (warnings, debug messages).
    ///
    /// Useful for scripting and when parsing JSON output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command while holding a slot on the target.
    ///
    /// Waits for a slot (see --backoff and --deadline), renews the lease in
    /// the background while the command runs, then releases it. Exits with
    /// the command's exit code, or 75 if no slot was acquired.
    Run(RunArgs),

    /// Acquire a slot once and print the lease token.
    Acquire(AcquireArgs),

    /// Extend a lease by its token.
    Renew(RenewArgs),

    /// Release a lease by its token. Succeeds if it is already gone.
    Release(ReleaseArgs),

    /// Show every slot of a target.
    Status(StatusArgs),
}

impl GlobalOptions {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> Result<LeaseConfig> {
        let mut config = LeaseConfig::load().context("invalid SLOTLEASE_* environment")?;
        if let Some(limit) = self.limit {
            config = config.with_concurrency_limit(limit);
        }
        if let Some(ttl_ms) = self.ttl_ms {
            config = config.with_lease_ttl_ms(ttl_ms);
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config = config.with_retry_backoff_ms(backoff_ms);
        }
        if let Some(raw) = &self.deadline {
            config = config.with_overall_deadline_ms(parse_deadline(raw)?);
        }
        config.validate().context("invalid lease options")?;
        Ok(config)
    }

    /// Client id to record in new leases.
    pub fn client_id(&self) -> String {
        match &self.client {
            Some(client) => client.clone(),
            None => {
                let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
                format!("{}-{}", host, std::process::id())
            }
        }
    }

    /// Lease directory.
    pub fn lease_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| std::env::temp_dir().join("slotlease"))
    }
}

fn parse_deadline(raw: &str) -> Result<Option<u64>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "inf" | "infinite" => Ok(None),
        value => {
            let ms = value.parse::<u64>().with_context(|| format!("invalid --deadline '{raw}'"))?;
            Ok(Some(ms))
        }
    }
}

impl Cli {
    /// Execute the CLI command, returning the process exit code.
    pub async fn run(self) -> Result<i32> {
        let config = self.global.config()?;
        let dir = self.global.lease_dir();
        let store = FileLeaseStore::open(&dir)
            .with_context(|| format!("failed to open lease directory {}", dir.display()))?;
        debug!(dir = %dir.display(), limit = config.concurrency_limit, "using lease directory");

        let manager: FileLeaseManager = LeaseManager::new(Arc::new(store), config);
        let json = self.global.is_json;
        let client = self.global.client_id();

        match self.command {
            Commands::Run(args) => args.run(manager, client, json).await,
            Commands::Acquire(args) => args.run(&manager, &client, json).await,
            Commands::Renew(args) => args.run(&manager, json).await,
            Commands::Release(args) => args.run(&manager, json).await,
            Commands::Status(args) => args.run(&manager, json).await,
        }
    }
}
