//! Fixed bounds and defaults for the lease protocol.
//!
//! Tiger Style: every tunable has an explicit upper or lower bound so a bad
//! configuration cannot produce unbounded scans or busy loops.

/// Default prefix for slot keys.
pub const DEFAULT_KEY_PREFIX: &str = "slotlease";

/// Separator between the fields of a persisted lease record.
pub const LEASE_FIELD_SEPARATOR: char = '|';

/// Default number of slots per target.
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 1;

/// Upper bound on slots per target. Every acquire may scan all of them.
pub const MAX_CONCURRENCY_LIMIT: u32 = 1024;

/// Default lease time-to-live (30 seconds).
pub const DEFAULT_LEASE_TTL_MS: u64 = 30_000;

/// Smallest accepted lease time-to-live.
pub const MIN_LEASE_TTL_MS: u64 = 30;

/// Default sleep between acquire attempts in a managed session.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

/// Renewals attempted per lease lifetime.
///
/// With three, one missed cycle still leaves a second attempt before expiry.
pub const RENEWALS_PER_TTL: u64 = 3;

/// Floor for the renewal interval.
pub const MIN_RENEW_INTERVAL_MS: u64 = 10;

/// Longest accepted target name, after normalization.
pub const MAX_TARGET_LENGTH: usize = 200;
