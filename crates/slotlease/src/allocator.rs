//! Slot claiming with double-checked locking.
//!
//! A target owns `limit` numbered slots, each one storage key. Claiming scans
//! them in ascending index order:
//!
//! 1. **Fast path**: read the slot without a lock. A live lease with a
//!    foreign token means skip, at no lock cost.
//! 2. **Slow path**: the slot looked claimable, so take its lock and read it
//!    again. Only if it is still claimable is the new lease written.
//!
//! The lock makes the slow-path read-then-write atomic with respect to other
//! claimers, so at most one writer wins each slot per race. The first index
//! won is the result. Ties are broken purely by index order, which means
//! sustained contention can starve a caller; retry policy belongs to the
//! caller.
//!
//! A storage error on one slot only makes that slot unusable for this scan.
//! Unparseable records are treated as free and get overwritten.

use std::sync::Arc;

use slotlease_store::LeaseStore;
use slotlease_store::StoreError;
use slotlease_time::TimeSource;
use tracing::debug;
use tracing::warn;

use crate::error::LeaseError;
use crate::lease::Lease;
use crate::lease::LeaseToken;
use crate::pure;

/// The slot won by a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedSlot {
    /// Winning slot index.
    pub index: u32,
    /// The lease now stored in that slot.
    pub lease: Lease,
}

/// Claims and maintains slots of targets in a [`LeaseStore`].
pub struct SlotAllocator<S: ?Sized, T: ?Sized> {
    store: Arc<S>,
    clock: Arc<T>,
    key_prefix: String,
    limit: u32,
}

impl<S, T> SlotAllocator<S, T>
where
    S: LeaseStore + ?Sized,
    T: TimeSource + ?Sized,
{
    /// Create an allocator scanning `limit` slots per target.
    pub fn new(store: Arc<S>, clock: Arc<T>, key_prefix: impl Into<String>, limit: u32) -> Self {
        Self {
            store,
            clock,
            key_prefix: key_prefix.into(),
            limit,
        }
    }

    /// Number of slots per target.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Current time from the injected clock.
    pub fn now_unix_ms(&self) -> u64 {
        self.clock.now_unix_ms()
    }

    /// Storage key for slot `index` of an already normalized target.
    pub fn slot_key(&self, target: &str, index: u32) -> String {
        pure::slot_key(&self.key_prefix, target, index)
    }

    /// Read and decode one slot. Empty or malformed records read as `None`.
    pub async fn read_slot(&self, key: &str) -> Result<Option<Lease>, StoreError> {
        let raw = match self.store.read(key).await? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };
        let lease = Lease::parse(&raw);
        if lease.is_none() {
            debug!(key, "unparseable lease record, treating slot as free");
        }
        Ok(lease)
    }

    /// Claim the first claimable slot of `target` for `token`.
    ///
    /// Fails with [`LeaseError::NoSlotAvailable`] when no slot could be won.
    pub async fn claim(
        &self,
        target: &str,
        client: &str,
        token: &LeaseToken,
        ttl_ms: u64,
    ) -> Result<ClaimedSlot, LeaseError> {
        let mut unreadable = 0;
        for index in 0..self.limit {
            let key = self.slot_key(target, index);

            // Fast path
            match self.read_slot(&key).await {
                Ok(current) if !self.is_claimable(current.as_ref(), token) => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "slot unreadable, skipping");
                    unreadable += 1;
                    continue;
                }
            }

            // Slow path
            match self.claim_locked(&key, client, token, ttl_ms).await {
                Ok(Some(lease)) => {
                    debug!(resource = target, slot = index, deadline_ms = lease.deadline_ms, "slot claimed");
                    return Ok(ClaimedSlot { index, lease });
                }
                Ok(None) => {
                    debug!(resource = target, slot = index, "slot taken by a concurrent claimer");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "slot claim failed, skipping");
                    unreadable += 1;
                }
            }
        }

        if unreadable > 0 {
            warn!(resource = target, limit = self.limit, unreadable, "no slot claimed, some slots failed in storage");
        }
        Err(LeaseError::NoSlotAvailable {
            target: target.to_string(),
            limit: self.limit,
            unreadable,
        })
    }

    /// Index of the first slot at or after `from` whose lease carries
    /// `token`, ignoring expiry.
    ///
    /// Unreadable slots are skipped.
    pub async fn find_token(&self, target: &str, token: &LeaseToken, from: u32) -> Option<u32> {
        for index in from..self.limit {
            let key = self.slot_key(target, index);
            match self.read_slot(&key).await {
                Ok(Some(lease)) if lease.matches(token) => return Some(index),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "slot unreadable during token scan"),
            }
        }
        None
    }

    /// Under the slot lock, extend the lease at `key` if it still carries `token`.
    ///
    /// Returns the rewritten lease, or `None` if the slot changed hands.
    pub async fn extend_locked(&self, key: &str, token: &LeaseToken, ttl_ms: u64) -> Result<Option<Lease>, StoreError> {
        let _guard = self.store.lock(key).await?;
        let Some(current) = self.read_slot(key).await? else {
            return Ok(None);
        };
        if !current.matches(token) {
            return Ok(None);
        }

        let deadline_ms = pure::compute_lease_deadline(self.clock.now_unix_ms(), ttl_ms);
        let renewed = Lease::new(&current.client, deadline_ms, current.token);
        self.store.write(key, &renewed.serialize()).await?;
        Ok(Some(renewed))
    }

    /// Under the slot lock, clear `key` if it still carries `token`.
    ///
    /// Returns whether the slot was cleared.
    pub async fn clear_locked(&self, key: &str, token: &LeaseToken) -> Result<bool, StoreError> {
        let _guard = self.store.lock(key).await?;
        match self.read_slot(key).await? {
            Some(current) if current.matches(token) => {
                self.store.delete(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_locked(
        &self,
        key: &str,
        client: &str,
        token: &LeaseToken,
        ttl_ms: u64,
    ) -> Result<Option<Lease>, StoreError> {
        let _guard = self.store.lock(key).await?;
        let current = self.read_slot(key).await?;
        if !self.is_claimable(current.as_ref(), token) {
            return Ok(None);
        }

        let deadline_ms = pure::compute_lease_deadline(self.clock.now_unix_ms(), ttl_ms);
        let lease = Lease::new(client, deadline_ms, token.clone());
        self.store.write(key, &lease.serialize()).await?;
        Ok(Some(lease))
    }

    fn is_claimable(&self, current: Option<&Lease>, token: &LeaseToken) -> bool {
        pure::is_slot_claimable(
            current.map(|lease| (lease.token.as_str(), lease.deadline_ms)),
            token.as_str(),
            self.clock.now_unix_ms(),
        )
    }
}

#[cfg(test)]
mod tests {
    use slotlease_store::InMemoryLeaseStore;
    use slotlease_time::SimulatedTimeSource;

    use super::*;

    const T0: u64 = 1_000_000;

    fn allocator(
        limit: u32,
    ) -> (SlotAllocator<InMemoryLeaseStore, SimulatedTimeSource>, Arc<InMemoryLeaseStore>, SimulatedTimeSource) {
        let store = InMemoryLeaseStore::new();
        let clock = SimulatedTimeSource::new(T0);
        let allocator = SlotAllocator::new(Arc::clone(&store), Arc::new(clock.clone()), "test", limit);
        (allocator, store, clock)
    }

    #[tokio::test]
    async fn test_claims_lowest_free_index() {
        let (allocator, store, _clock) = allocator(3);

        let first = allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();
        let second = allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.unwrap();

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(first.lease.deadline_ms, T0 + 10_000);
        assert_eq!(store.read("test:printer:0").await.unwrap().as_deref(), Some("a|1010000|ta"));
    }

    #[tokio::test]
    async fn test_full_target_reports_no_slot() {
        let (allocator, _store, _clock) = allocator(1);
        allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();

        let err = allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.unwrap_err();
        assert!(matches!(err, LeaseError::NoSlotAvailable { limit: 1, .. }));
    }

    #[tokio::test]
    async fn test_same_token_reclaims_its_slot() {
        let (allocator, _store, clock) = allocator(2);
        let token = LeaseToken::new("ta");

        let first = allocator.claim("printer", "a", &token, 10_000).await.unwrap();
        clock.advance_ms(500);
        let retry = allocator.claim("printer", "a", &token, 10_000).await.unwrap();

        assert_eq!(retry.index, first.index);
        assert_eq!(retry.lease.deadline_ms, T0 + 500 + 10_000);
    }

    #[tokio::test]
    async fn test_expired_slot_is_superseded() {
        let (allocator, _store, clock) = allocator(1);
        allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();

        clock.advance_ms(10_000);
        assert!(allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.is_err());

        clock.advance_ms(1);
        let claimed = allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.unwrap();
        assert_eq!(claimed.index, 0);
        assert_eq!(claimed.lease.token.as_str(), "tb");
    }

    #[tokio::test]
    async fn test_malformed_record_is_overwritten() {
        let (allocator, store, _clock) = allocator(1);
        store.write("test:printer:0", "garbage-without-separators").await.unwrap();

        let claimed = allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();
        assert_eq!(claimed.index, 0);
        assert_eq!(allocator.read_slot("test:printer:0").await.unwrap(), Some(claimed.lease));
    }

    #[tokio::test]
    async fn test_storage_error_skips_only_that_slot() {
        let (allocator, store, _clock) = allocator(3);
        store.inject_failure("test:printer:0").await;

        let claimed = allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();
        assert_eq!(claimed.index, 1);
    }

    #[tokio::test]
    async fn test_no_slot_counts_unreadable_slots() {
        let (allocator, store, _clock) = allocator(3);
        allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();
        allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.unwrap();
        store.inject_failure("test:printer:2").await;

        let err = allocator.claim("printer", "c", &LeaseToken::new("tc"), 10_000).await.unwrap_err();
        assert!(matches!(err, LeaseError::NoSlotAvailable { limit: 3, unreadable: 1, .. }));
        assert_eq!(err.to_string(), "no slot available on 'printer': 2 of 3 slots are held, 1 unreadable");
    }

    #[tokio::test]
    async fn test_all_slots_failing_reports_no_slot() {
        let (allocator, store, _clock) = allocator(2);
        store.inject_failure("test:printer:0").await;
        store.inject_failure("test:printer:1").await;

        let err = allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap_err();
        assert!(matches!(err, LeaseError::NoSlotAvailable { limit: 2, unreadable: 2, .. }));
        assert_eq!(err.to_string(), "no slot available on 'printer': all 2 slots are unreadable");
    }

    #[tokio::test]
    async fn test_find_token_ignores_expiry() {
        let (allocator, _store, clock) = allocator(3);
        allocator.claim("printer", "a", &LeaseToken::new("ta"), 10_000).await.unwrap();
        allocator.claim("printer", "b", &LeaseToken::new("tb"), 10_000).await.unwrap();

        clock.advance_ms(60_000);
        assert_eq!(allocator.find_token("printer", &LeaseToken::new("tb"), 0).await, Some(1));
        assert_eq!(allocator.find_token("printer", &LeaseToken::new("tb"), 2).await, None);
        assert_eq!(allocator.find_token("printer", &LeaseToken::new("nope"), 0).await, None);
    }

    #[tokio::test]
    async fn test_extend_and_clear_check_token_under_lock() {
        let (allocator, _store, clock) = allocator(1);
        let token = LeaseToken::new("ta");
        allocator.claim("printer", "a", &token, 10_000).await.unwrap();

        clock.advance_ms(1_000);
        let key = allocator.slot_key("printer", 0);
        let renewed = allocator.extend_locked(&key, &token, 10_000).await.unwrap().unwrap();
        assert_eq!(renewed.deadline_ms, T0 + 11_000);
        assert_eq!(renewed.client, "a");
        assert_eq!(allocator.extend_locked(&key, &LeaseToken::new("other"), 10_000).await.unwrap(), None);

        assert!(!allocator.clear_locked(&key, &LeaseToken::new("other")).await.unwrap());
        assert!(allocator.clear_locked(&key, &token).await.unwrap());
        assert_eq!(allocator.read_slot(&key).await.unwrap(), None);
    }
}
