//! Background renewal of a held lease.
//!
//! # Tiger Style
//!
//! - One task per held lease, owned by a handle
//! - Cancellation is explicit and `stop()` joins the task
//! - Renewal failures are logged and retried on the next cycle, never escalated

use std::time::Duration;

use slotlease_store::LeaseStore;
use slotlease_time::TimeSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::lease::LeaseToken;
use crate::manager::AcquiredLease;
use crate::manager::LeaseManager;
use crate::pure;

/// Latest renewal outcome, published after every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalHealth {
    /// Deadline from the last successful renewal (or the acquire).
    pub deadline_ms: u64,
    /// Failed renewals since the last success.
    pub consecutive_failures: u32,
    /// Successful renewals so far.
    pub renewals: u64,
}

/// Keeps one lease alive by renewing it every `ttl / 3`.
///
/// Dropping the supervisor signals cancellation but cannot wait for the task.
/// Call [`stop`](Self::stop) before releasing the lease so a late renewal can
/// never rewrite the slot after release.
pub struct RenewalSupervisor {
    cancel_tx: watch::Sender<bool>,
    health_rx: watch::Receiver<RenewalHealth>,
    task: Option<JoinHandle<()>>,
    target: String,
}

impl RenewalSupervisor {
    /// Spawn the renewal loop for `lease`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, T>(manager: LeaseManager<S, T>, lease: &AcquiredLease, ttl_ms: u64) -> Self
    where
        S: LeaseStore + ?Sized + 'static,
        T: TimeSource + ?Sized + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (health_tx, health_rx) = watch::channel(RenewalHealth {
            deadline_ms: lease.deadline_ms,
            consecutive_failures: 0,
            renewals: 0,
        });

        let interval = Duration::from_millis(pure::renewal_interval_ms(ttl_ms));
        debug!(
            resource = %lease.target,
            slot = lease.slot,
            interval_ms = interval.as_millis() as u64,
            "starting lease renewal"
        );

        let task = tokio::spawn(renewal_loop(
            manager,
            lease.target.clone(),
            lease.token.clone(),
            ttl_ms,
            interval,
            cancel_rx,
            health_tx,
        ));

        Self {
            cancel_tx,
            health_rx,
            task: Some(task),
            target: lease.target.clone(),
        }
    }

    /// Current renewal health.
    pub fn health(&self) -> RenewalHealth {
        *self.health_rx.borrow()
    }

    /// Subscribe to renewal health changes.
    pub fn subscribe(&self) -> watch::Receiver<RenewalHealth> {
        self.health_rx.clone()
    }

    /// Target being renewed.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Cancel the loop and wait until it has exited.
    ///
    /// A renewal already in flight completes first.
    pub async fn stop(mut self) {
        let _ = self.cancel_tx.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(resource = %self.target, error = %e, "renewal task ended abnormally");
        }
        debug!(resource = %self.target, "lease renewal stopped");
    }
}

impl Drop for RenewalSupervisor {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

async fn renewal_loop<S, T>(
    manager: LeaseManager<S, T>,
    target: String,
    token: LeaseToken,
    ttl_ms: u64,
    interval: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    health_tx: watch::Sender<RenewalHealth>,
) where
    S: LeaseStore + ?Sized,
    T: TimeSource + ?Sized,
{
    let mut health = *health_tx.borrow();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel_rx.changed() => {
                // A closed channel means the handle is gone
                if changed.is_err() || *cancel_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        match manager.renew(&target, &token, ttl_ms).await {
            Ok(deadline_ms) => {
                health.deadline_ms = deadline_ms;
                health.consecutive_failures = 0;
                health.renewals += 1;
            }
            Err(e) => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                warn!(
                    resource = %target,
                    error = %e,
                    consecutive_failures = health.consecutive_failures,
                    "lease renewal failed, retrying next cycle"
                );
            }
        }
        let _ = health_tx.send(health);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotlease_store::InMemoryLeaseStore;
    use slotlease_time::SimulatedTimeSource;

    use super::*;
    use crate::config::LeaseConfig;
    use crate::manager::SlotState;

    fn manager(
        store: Arc<InMemoryLeaseStore>,
        clock: &SimulatedTimeSource,
    ) -> LeaseManager<InMemoryLeaseStore, SimulatedTimeSource> {
        LeaseManager::with_clock(store, Arc::new(clock.clone()), LeaseConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_every_third_of_ttl() {
        let clock = SimulatedTimeSource::new(1_000_000);
        let manager = manager(InMemoryLeaseStore::new(), &clock);
        let lease = manager.acquire("printer", "a", 3_000).await.unwrap();

        let supervisor = RenewalSupervisor::start(manager.clone(), &lease, 3_000);
        clock.advance_ms(500);
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let health = supervisor.health();
        assert_eq!(health.renewals, 1);
        assert_eq!(health.deadline_ms, 1_000_500 + 3_000);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(supervisor.health().renewals, 2);
        supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_renewals() {
        let clock = SimulatedTimeSource::new(1_000_000);
        let manager = manager(InMemoryLeaseStore::new(), &clock);
        let lease = manager.acquire("printer", "a", 3_000).await.unwrap();

        let supervisor = RenewalSupervisor::start(manager.clone(), &lease, 3_000);
        let health_rx = supervisor.subscribe();
        supervisor.stop().await;

        // Released after stop, nothing may bring the lease back
        manager.release("printer", &lease.token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        let slots = manager.status("printer").await.unwrap();
        assert_eq!(slots[0].state, SlotState::Free);
        assert_eq!(health_rx.borrow().renewals, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_recovered() {
        let store = InMemoryLeaseStore::new();
        let clock = SimulatedTimeSource::new(1_000_000);
        let manager = manager(Arc::clone(&store), &clock);
        let lease = manager.acquire("printer", "a", 3_000).await.unwrap();

        let supervisor = RenewalSupervisor::start(manager.clone(), &lease, 3_000);
        store.inject_failure("slotlease:printer:0").await;
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(supervisor.health().consecutive_failures, 2);
        assert_eq!(supervisor.health().renewals, 0);

        store.clear_failures().await;
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let health = supervisor.health();
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.renewals, 1);
        supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_loop() {
        let clock = SimulatedTimeSource::new(1_000_000);
        let manager = manager(InMemoryLeaseStore::new(), &clock);
        let lease = manager.acquire("printer", "a", 3_000).await.unwrap();

        let supervisor = RenewalSupervisor::start(manager.clone(), &lease, 3_000);
        let health_rx = supervisor.subscribe();
        drop(supervisor);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(health_rx.borrow().renewals, 0);
    }
}
