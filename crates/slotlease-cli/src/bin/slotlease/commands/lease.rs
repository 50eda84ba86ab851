//! One-shot lease commands.
//!
//! `acquire`, `renew`, `release` and `status` each perform a single protocol
//! operation and exit. Scripts that manage leases this way are responsible
//! for renewing before the TTL runs out.

use anyhow::Result;
use clap::Args;
use slotlease::LeaseError;
use slotlease::LeaseToken;

use super::EXIT_NO_SLOT;
use crate::cli::FileLeaseManager;
use crate::output::LeaseOutput;
use crate::output::RenewOutput;
use crate::output::StatusOutput;
use crate::output::print_failure;
use crate::output::print_output;
use crate::output::print_success;

#[derive(Args)]
pub struct AcquireArgs {
    /// Target name.
    pub target: String,
}

#[derive(Args)]
pub struct RenewArgs {
    /// Target name.
    pub target: String,

    /// Token printed by `acquire`.
    pub token: String,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Target name.
    pub target: String,

    /// Token printed by `acquire`.
    pub token: String,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Target name.
    pub target: String,
}

impl AcquireArgs {
    pub async fn run(self, manager: &FileLeaseManager, client: &str, json: bool) -> Result<i32> {
        let ttl_ms = manager.config().lease_ttl_ms;
        match manager.acquire(&self.target, client, ttl_ms).await {
            Ok(lease) => {
                print_output(&LeaseOutput { lease }, json);
                Ok(0)
            }
            Err(e @ LeaseError::NoSlotAvailable { .. }) => {
                print_failure("acquire", &e.to_string(), json);
                Ok(EXIT_NO_SLOT)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl RenewArgs {
    pub async fn run(self, manager: &FileLeaseManager, json: bool) -> Result<i32> {
        let ttl_ms = manager.config().lease_ttl_ms;
        match manager.renew(&self.target, &LeaseToken::new(self.token), ttl_ms).await {
            Ok(deadline_ms) => {
                print_output(
                    &RenewOutput {
                        target: self.target,
                        deadline_ms,
                    },
                    json,
                );
                Ok(0)
            }
            Err(e @ LeaseError::NoLeaseHeld { .. }) => {
                print_failure("renew", &e.to_string(), json);
                Ok(1)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ReleaseArgs {
    pub async fn run(self, manager: &FileLeaseManager, json: bool) -> Result<i32> {
        manager.release(&self.target, &LeaseToken::new(self.token)).await?;
        print_success(&format!("Released '{}'", self.target), json);
        Ok(0)
    }
}

impl StatusArgs {
    pub async fn run(self, manager: &FileLeaseManager, json: bool) -> Result<i32> {
        let slots = manager.status(&self.target).await?;
        let target = slotlease::pure::normalize_target(&self.target).unwrap_or(self.target);
        print_output(
            &StatusOutput {
                target,
                now_ms: manager.now_unix_ms(),
                slots,
            },
            json,
        );
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotlease::LeaseConfig;
    use slotlease::LeaseManager;
    use slotlease_store::FileLeaseStore;

    use super::*;

    #[tokio::test]
    async fn test_renew_and_release_reject_unstorable_token() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LeaseManager::new(Arc::new(FileLeaseStore::open(dir.path()).unwrap()), LeaseConfig::default());

        let renew = RenewArgs {
            target: "job".to_string(),
            token: "a|b".to_string(),
        };
        let err = renew.run(&manager, true).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<LeaseError>(), Some(LeaseError::InvalidToken { .. })));

        let release = ReleaseArgs {
            target: "job".to_string(),
            token: "a|b".to_string(),
        };
        assert!(release.run(&manager, true).await.is_err());
    }
}
