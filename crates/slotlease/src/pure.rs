//! Pure functions for the slot lease protocol.
//!
//! Key layout, target normalization, deadline arithmetic and the slot
//! claimability decision live here so they can be tested without a store or
//! a runtime. All functions are deterministic: time is passed in explicitly.
//!
//! # Tiger Style
//!
//! - Saturating arithmetic for every deadline computation
//! - Explicit types (u64 milliseconds, u32 slot indices)
//! - No panics; all functions are total

use crate::constants::LEASE_FIELD_SEPARATOR;
use crate::constants::MAX_TARGET_LENGTH;
use crate::constants::MIN_RENEW_INTERVAL_MS;
use crate::constants::RENEWALS_PER_TTL;

// ============================================================================
// Keys
// ============================================================================

/// Strip every character that is not safe in a storage key.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`. Returns `None` when nothing
/// usable remains or the result exceeds [`MAX_TARGET_LENGTH`].
///
/// ```ignore
/// assert_eq!(normalize_target("HP LaserJet #4"), Some("HPLaserJet4".to_string()));
/// assert_eq!(normalize_target("///"), None);
/// ```
pub fn normalize_target(raw: &str) -> Option<String> {
    let normalized: String =
        raw.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')).collect();

    // A bare run of dots would resolve to a directory on file-backed stores.
    if normalized.is_empty() || normalized.chars().all(|c| c == '.') || normalized.len() > MAX_TARGET_LENGTH {
        return None;
    }
    Some(normalized)
}

/// Storage key of one slot: `{prefix}:{target}:{index}`.
#[inline]
pub fn slot_key(prefix: &str, target: &str, index: u32) -> String {
    format!("{prefix}:{target}:{index}")
}

/// Remove the field separator from a client id so the record stays parseable.
pub fn sanitize_client(client: &str) -> String {
    client.chars().filter(|c| *c != LEASE_FIELD_SEPARATOR && *c != '\n').collect()
}

/// Whether `token` survives a round trip through a lease record.
///
/// A token must be non-empty and free of the field separator and line
/// breaks. A token that fails this would be written as a record that reads
/// back as a free slot.
#[inline]
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && !token.chars().any(|c| c == LEASE_FIELD_SEPARATOR || c == '\n' || c == '\r')
}

// ============================================================================
// Deadlines
// ============================================================================

/// Absolute deadline of a lease taken at `now_ms` for `ttl_ms`.
#[inline]
pub fn compute_lease_deadline(now_ms: u64, ttl_ms: u64) -> u64 {
    now_ms.saturating_add(ttl_ms)
}

/// A lease is expired strictly after its deadline.
#[inline]
pub fn is_lease_expired(deadline_ms: u64, now_ms: u64) -> bool {
    now_ms > deadline_ms
}

/// Time left before `deadline_ms`, zero once passed.
#[inline]
pub fn remaining_ttl_ms(deadline_ms: u64, now_ms: u64) -> u64 {
    deadline_ms.saturating_sub(now_ms)
}

/// Sleep between renewals for a lease of `ttl_ms`.
#[inline]
pub fn renewal_interval_ms(ttl_ms: u64) -> u64 {
    (ttl_ms / RENEWALS_PER_TTL).max(MIN_RENEW_INTERVAL_MS)
}

// ============================================================================
// Claimability
// ============================================================================

/// Decide whether a slot may be claimed by `token`.
///
/// `holder` is the `(token, deadline_ms)` of the lease currently in the slot,
/// or `None` when the slot is free or its record is unreadable. A slot is
/// claimable when free, when its lease has expired, or when it is already
/// held by `token` (so a retried acquire is idempotent).
pub fn is_slot_claimable(holder: Option<(&str, u64)>, token: &str, now_ms: u64) -> bool {
    match holder {
        None => true,
        Some((holder_token, deadline_ms)) => holder_token == token || is_lease_expired(deadline_ms, now_ms),
    }
}
