//! `slotlease run`: hold a slot for the lifetime of a child process.

use std::process::ExitStatus;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use slotlease::ManagedSession;
use slotlease::SessionError;
use tokio::process::Command;
use tracing::info;
use tracing::warn;

use super::EXIT_NO_SLOT;
use crate::cli::FileLeaseManager;
use crate::output::print_failure;

#[derive(Args)]
pub struct RunArgs {
    /// Target name.
    pub target: String,

    /// Command and arguments to run, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    pub async fn run(self, manager: FileLeaseManager, client: String, json: bool) -> Result<i32> {
        let Some((program, args)) = self.command.split_first() else {
            anyhow::bail!("no command given");
        };

        let session = ManagedSession::new(manager, &self.target, client);
        let outcome = session
            .run(|lease| async move {
                info!(resource = %lease.target, slot = lease.slot, program = %program, "running command");
                run_child(program, args).await
            })
            .await;

        match outcome {
            Ok(status) => {
                let status = status.with_context(|| format!("failed to run '{program}'"))?;
                Ok(exit_code(status))
            }
            Err(e @ SessionError::AcquireTimeout { .. }) => {
                print_failure("run", &e.to_string(), json);
                Ok(EXIT_NO_SLOT)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawn the child and wait for it, forwarding Ctrl-C as a kill.
async fn run_child(program: &str, args: &[String]) -> std::io::Result<ExitStatus> {
    let mut child = Command::new(program).args(args).kill_on_drop(true).spawn()?;

    tokio::select! {
        status = child.wait() => return status,
        _ = tokio::signal::ctrl_c() => {}
    }

    warn!(program, "interrupted, stopping child");
    child.kill().await?;
    child.wait().await
}

/// Exit code to propagate; signals map to `128 + signo` like a shell.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotlease::LeaseConfig;
    use slotlease::LeaseManager;
    use slotlease_store::FileLeaseStore;

    use super::*;

    fn manager(dir: &std::path::Path) -> FileLeaseManager {
        let config = LeaseConfig::default().with_overall_deadline_ms(Some(200)).with_retry_backoff_ms(50);
        LeaseManager::new(Arc::new(FileLeaseStore::open(dir).unwrap()), config)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_propagates_child_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            target: "job".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
        };
        assert_eq!(args.run(manager(dir.path()), "me".to_string(), false).await.unwrap(), 3);

        // Slot was released afterwards
        let slots = manager(dir.path()).status("job").await.unwrap();
        assert_eq!(slots[0].state, slotlease::SlotState::Free);
    }

    #[tokio::test]
    async fn test_no_slot_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let holder = manager(dir.path());
        holder.acquire("job", "other", 60_000).await.unwrap();

        let args = RunArgs {
            target: "job".to_string(),
            command: vec!["true".to_string()],
        };
        assert_eq!(args.run(manager(dir.path()), "me".to_string(), true).await.unwrap(), EXIT_NO_SLOT);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            target: "job".to_string(),
            command: vec!["/nonexistent/slotlease-test-binary".to_string()],
        };
        assert!(args.run(manager(dir.path()), "me".to_string(), false).await.is_err());
    }
}
