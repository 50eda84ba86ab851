//! Scoped acquisition: acquire with retry, keep renewed, always release.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use slotlease_store::LeaseStore;
use slotlease_time::TimeSource;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::LeaseError;
use crate::error::SessionError;
use crate::manager::AcquiredLease;
use crate::manager::LeaseManager;
use crate::supervisor::RenewalSupervisor;

/// Runs a protected section while holding a slot on one target.
///
/// Acquisition retries with a uniform backoff until it succeeds or the
/// overall deadline passes. While the section runs, a [`RenewalSupervisor`]
/// keeps the lease alive. On exit, normal or panicking, the supervisor is
/// stopped and then the lease is released.
///
/// # Example
///
/// ```ignore
/// let session = ManagedSession::new(manager, "printer", "worker-1")
///     .with_overall_deadline(Some(Duration::from_secs(5)));
///
/// let pages = session.run(|lease| async move {
///     print_job(lease.slot).await
/// }).await?;
/// ```
pub struct ManagedSession<S: ?Sized, T: ?Sized> {
    manager: LeaseManager<S, T>,
    target: String,
    client: String,
    lease_ttl_ms: u64,
    retry_backoff: Duration,
    overall_deadline: Option<Duration>,
}

impl<S, T> ManagedSession<S, T>
where
    S: LeaseStore + ?Sized + 'static,
    T: TimeSource + ?Sized + 'static,
{
    /// Create a session taking TTL, backoff and deadline from the manager's
    /// configuration.
    pub fn new(manager: LeaseManager<S, T>, target: impl Into<String>, client: impl Into<String>) -> Self {
        let config = manager.config();
        let lease_ttl_ms = config.lease_ttl_ms;
        let retry_backoff = Duration::from_millis(config.retry_backoff_ms);
        let overall_deadline = config.overall_deadline();
        Self {
            manager,
            target: target.into(),
            client: client.into(),
            lease_ttl_ms,
            retry_backoff,
            overall_deadline,
        }
    }

    /// Lease lifetime per acquire and renewal.
    pub fn with_lease_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.lease_ttl_ms = ttl_ms;
        self
    }

    /// Sleep between acquire attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Give up acquiring after `deadline`; `None` retries forever.
    pub fn with_overall_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.overall_deadline = deadline;
        self
    }

    /// Acquire a slot, retrying until the overall deadline.
    ///
    /// The deadline is checked after each failed attempt, so at least one
    /// attempt is always made. Errors that retrying cannot fix are returned
    /// immediately.
    pub async fn acquire(&self) -> Result<AcquiredLease, SessionError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            let err = match self.manager.acquire(&self.target, &self.client, self.lease_ttl_ms).await {
                Ok(lease) => {
                    debug!(resource = %lease.target, slot = lease.slot, attempts, "session acquired slot");
                    return Ok(lease);
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(SessionError::Lease { source: e }),
            };

            let elapsed = started.elapsed();
            let sleep_for = match self.overall_deadline {
                Some(deadline) if elapsed >= deadline => {
                    return Err(self.timeout_error(&err, attempts, elapsed));
                }
                Some(deadline) => self.retry_backoff.min(deadline - elapsed),
                None => self.retry_backoff,
            };

            debug!(
                resource = %self.target,
                attempts,
                error = %err,
                backoff_ms = sleep_for.as_millis() as u64,
                "acquire attempt failed, backing off"
            );
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Acquire, run `protected` under renewal, then stop renewal and release.
    ///
    /// If acquisition fails the section never runs and no renewal task is
    /// started. A panic in the section is resumed after cleanup. A failed
    /// release is only logged; the lease then lapses at its deadline.
    pub async fn run<F, Fut, R>(&self, protected: F) -> Result<R, SessionError>
    where
        F: FnOnce(AcquiredLease) -> Fut,
        Fut: Future<Output = R>,
    {
        let lease = self.acquire().await?;
        let supervisor = RenewalSupervisor::start(self.manager.clone(), &lease, self.lease_ttl_ms);
        let token = lease.token.clone();
        let target = lease.target.clone();

        let outcome = AssertUnwindSafe(protected(lease)).catch_unwind().await;

        supervisor.stop().await;
        match self.manager.release(&target, &token).await {
            Ok(()) => debug!(resource = %target, "session released slot"),
            Err(e) => warn!(resource = %target, error = %e, "session release failed, lease will expire"),
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => {
                info!(resource = %target, "protected section panicked after cleanup, resuming");
                std::panic::resume_unwind(panic)
            }
        }
    }

    fn timeout_error(&self, last: &LeaseError, attempts: u32, elapsed: Duration) -> SessionError {
        let target = match last {
            LeaseError::NoSlotAvailable { target, .. } => target.clone(),
            _ => self.target.clone(),
        };
        info!(resource = %target, attempts, elapsed_ms = elapsed.as_millis() as u64, "gave up acquiring slot");
        SessionError::AcquireTimeout {
            target,
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}
