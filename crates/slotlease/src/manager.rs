//! Public acquire/renew/release API.
//!
//! [`LeaseManager`] is the only writer of lease records. It owns no state of
//! its own beyond the injected store, clock and configuration, so any number
//! of managers (in one process or many) can share a store.
//!
//! # Slot lifecycle
//!
//! ```text
//! Free --acquire--> Held(token) --renew--> Held(token, later deadline)
//!   ^                    |
//!   +-- release, or superseded by another acquire after expiry
//! ```

use std::sync::Arc;

use serde::Serialize;
use slotlease_store::LeaseStore;
use slotlease_time::SystemTimeSource;
use slotlease_time::TimeSource;
use tracing::debug;
use tracing::warn;

use crate::allocator::SlotAllocator;
use crate::config::LeaseConfig;
use crate::error::LeaseError;
use crate::lease::Lease;
use crate::lease::LeaseToken;
use crate::pure;

/// Result of a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredLease {
    /// Normalized target name.
    pub target: String,
    /// Client id recorded in the lease.
    pub client: String,
    /// Ownership token; required to renew or release.
    pub token: LeaseToken,
    /// Slot index that was won.
    pub slot: u32,
    /// Absolute expiry (Unix milliseconds).
    pub deadline_ms: u64,
}

/// Observed state of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// No lease, or an unparseable record.
    Free,
    /// A live lease.
    Held {
        /// The stored lease.
        lease: Lease,
    },
    /// A lease past its deadline that nobody has superseded yet.
    Expired {
        /// The stored lease.
        lease: Lease,
    },
    /// The store failed to return the slot.
    Unreadable {
        /// Error description.
        reason: String,
    },
}

/// One slot as reported by [`LeaseManager::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    /// Slot index.
    pub index: u32,
    /// Storage key.
    pub key: String,
    /// What the slot holds.
    #[serde(flatten)]
    pub state: SlotState,
}

/// Bounded-concurrency lease manager.
///
/// # Example
///
/// ```ignore
/// let manager = LeaseManager::new(store, LeaseConfig::default().with_concurrency_limit(2));
///
/// let lease = manager.acquire("printer", "worker-1", 10_000).await?;
/// manager.renew("printer", &lease.token, 10_000).await?;
/// manager.release("printer", &lease.token).await?;
/// ```
pub struct LeaseManager<S: ?Sized, T: ?Sized = SystemTimeSource> {
    allocator: Arc<SlotAllocator<S, T>>,
    config: Arc<LeaseConfig>,
}

impl<S: ?Sized, T: ?Sized> Clone for LeaseManager<S, T> {
    fn clone(&self) -> Self {
        Self {
            allocator: Arc::clone(&self.allocator),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> LeaseManager<S, SystemTimeSource>
where S: LeaseStore + ?Sized
{
    /// Create a manager using the system clock.
    pub fn new(store: Arc<S>, config: LeaseConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemTimeSource), config)
    }
}

impl<S, T> LeaseManager<S, T>
where
    S: LeaseStore + ?Sized,
    T: TimeSource + ?Sized,
{
    /// Create a manager with an injected clock.
    pub fn with_clock(store: Arc<S>, clock: Arc<T>, config: LeaseConfig) -> Self {
        let allocator = SlotAllocator::new(store, clock, config.key_prefix.clone(), config.concurrency_limit);
        Self {
            allocator: Arc::new(allocator),
            config: Arc::new(config),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Current time from the manager's clock.
    pub fn now_unix_ms(&self) -> u64 {
        self.allocator.now_unix_ms()
    }

    /// Acquire a slot on `target` with a fresh token.
    ///
    /// Never sleeps or retries; a full target fails immediately with
    /// [`LeaseError::NoSlotAvailable`].
    pub async fn acquire(&self, target: &str, client: &str, ttl_ms: u64) -> Result<AcquiredLease, LeaseError> {
        let target = normalize(target)?;
        self.claim(target, client, LeaseToken::generate(), ttl_ms).await
    }

    /// Acquire a slot on `target` with a caller-chosen token.
    ///
    /// Idempotent for the same token: retrying after an ambiguous failure
    /// extends the slot the token already holds instead of taking a second,
    /// even when a lower slot has freed up since. Tokens that cannot be
    /// stored in a lease record fail with [`LeaseError::InvalidToken`].
    pub async fn acquire_with_token(
        &self,
        target: &str,
        client: &str,
        token: LeaseToken,
        ttl_ms: u64,
    ) -> Result<AcquiredLease, LeaseError> {
        let target = normalize(target)?;
        check_token(&token)?;

        let mut from = 0;
        while let Some(index) = self.allocator.find_token(&target, &token, from).await {
            let key = self.allocator.slot_key(&target, index);
            match self.allocator.extend_locked(&key, &token, ttl_ms).await {
                Ok(Some(lease)) => {
                    debug!(resource = %target, slot = index, "token already holds a slot, extended");
                    return Ok(AcquiredLease {
                        target,
                        client: lease.client,
                        token,
                        slot: index,
                        deadline_ms: lease.deadline_ms,
                    });
                }
                Ok(None) => {}
                Err(source) => return Err(LeaseError::Storage { key, source }),
            }
            from = index + 1;
        }

        self.claim(target, client, token, ttl_ms).await
    }

    async fn claim(&self, target: String, client: &str, token: LeaseToken, ttl_ms: u64) -> Result<AcquiredLease, LeaseError> {
        let claimed = self.allocator.claim(&target, client, &token, ttl_ms).await?;
        Ok(AcquiredLease {
            target,
            client: claimed.lease.client,
            token,
            slot: claimed.index,
            deadline_ms: claimed.lease.deadline_ms,
        })
    }

    /// Extend the lease carrying `token` to now + `ttl_ms`.
    ///
    /// Matches by token only, so a lease past its deadline can still be
    /// renewed as long as nobody has claimed the slot. Returns the new
    /// deadline.
    pub async fn renew(&self, target: &str, token: &LeaseToken, ttl_ms: u64) -> Result<u64, LeaseError> {
        let target = normalize(target)?;
        check_token(token)?;

        let mut from = 0;
        while let Some(index) = self.allocator.find_token(&target, token, from).await {
            let key = self.allocator.slot_key(&target, index);
            match self.allocator.extend_locked(&key, token, ttl_ms).await {
                Ok(Some(lease)) => {
                    debug!(resource = %target, slot = index, deadline_ms = lease.deadline_ms, "lease renewed");
                    return Ok(lease.deadline_ms);
                }
                Ok(None) => {
                    debug!(resource = %target, slot = index, "lease superseded before renewal");
                }
                Err(source) => return Err(LeaseError::Storage { key, source }),
            }
            from = index + 1;
        }

        Err(LeaseError::NoLeaseHeld { target })
    }

    /// Clear every slot carrying `token`.
    ///
    /// Succeeds without doing anything when no slot carries the token, since
    /// the desired end state already holds. A storage failure stops the scan
    /// and is returned; slots already cleared stay cleared.
    pub async fn release(&self, target: &str, token: &LeaseToken) -> Result<(), LeaseError> {
        let target = normalize(target)?;
        check_token(token)?;

        let mut cleared = 0u32;
        let mut from = 0;
        while let Some(index) = self.allocator.find_token(&target, token, from).await {
            let key = self.allocator.slot_key(&target, index);
            match self.allocator.clear_locked(&key, token).await {
                Ok(true) => {
                    debug!(resource = %target, slot = index, "lease released");
                    cleared += 1;
                }
                Ok(false) => {}
                Err(source) => {
                    warn!(key = %key, error = %source, "failed to clear slot");
                    return Err(LeaseError::Storage { key, source });
                }
            }
            from = index + 1;
        }

        if cleared == 0 {
            debug!(resource = %target, "release found no lease for token");
        }
        Ok(())
    }

    /// Report every slot of `target` without taking locks.
    pub async fn status(&self, target: &str) -> Result<Vec<SlotStatus>, LeaseError> {
        let target = normalize(target)?;
        let now_ms = self.allocator.now_unix_ms();

        let mut slots = Vec::with_capacity(self.allocator.limit() as usize);
        for index in 0..self.allocator.limit() {
            let key = self.allocator.slot_key(&target, index);
            let state = match self.allocator.read_slot(&key).await {
                Ok(None) => SlotState::Free,
                Ok(Some(lease)) if lease.is_expired(now_ms) => SlotState::Expired { lease },
                Ok(Some(lease)) => SlotState::Held { lease },
                Err(e) => SlotState::Unreadable { reason: e.to_string() },
            };
            slots.push(SlotStatus { index, key, state });
        }
        Ok(slots)
    }
}

fn check_token(token: &LeaseToken) -> Result<(), LeaseError> {
    if token.is_valid() {
        Ok(())
    } else {
        Err(LeaseError::InvalidToken {
            token: token.to_string(),
        })
    }
}

fn normalize(target: &str) -> Result<String, LeaseError> {
    pure::normalize_target(target).ok_or_else(|| LeaseError::InvalidTarget {
        target: target.to_string(),
    })
}
