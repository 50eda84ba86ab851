//! Error types for the lease protocol.

use slotlease_store::StoreError;
use snafu::Snafu;

/// Errors from [`LeaseManager`](crate::LeaseManager) operations.
///
/// All variants are expected outcomes of a contended protocol. None of them
/// leave a slot in an unusable state.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LeaseError {
    /// No slot could be won: each one holds a live lease with a foreign
    /// token or could not be read.
    #[snafu(display("no slot available on '{target}': {}", slot_summary(*limit, *unreadable)))]
    NoSlotAvailable {
        /// Normalized target name.
        target: String,
        /// Concurrency limit that was scanned.
        limit: u32,
        /// Slots skipped because the store failed on them.
        unreadable: u32,
    },

    /// No slot carries the presented token.
    #[snafu(display("no lease held on '{target}' for the presented token"))]
    NoLeaseHeld {
        /// Normalized target name.
        target: String,
    },

    /// The backend failed while updating a slot that was already located.
    #[snafu(display("storage error on '{key}': {source}"))]
    Storage {
        /// Slot key being accessed.
        key: String,
        /// The underlying error.
        source: StoreError,
    },

    /// The token cannot be stored in a lease record.
    #[snafu(display("invalid lease token '{token}': must be non-empty without '|' or line breaks"))]
    InvalidToken {
        /// The token as given by the caller.
        token: String,
    },

    /// The target name has no usable characters or is too long.
    #[snafu(display("invalid target '{target}'"))]
    InvalidTarget {
        /// The target as given by the caller.
        target: String,
    },
}

impl LeaseError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaseError::NoSlotAvailable { .. } | LeaseError::Storage { .. })
    }
}

fn slot_summary(limit: u32, unreadable: u32) -> String {
    match unreadable {
        0 => format!("all {limit} slots are held"),
        n if n >= limit => format!("all {limit} slots are unreadable"),
        n => format!("{} of {limit} slots are held, {n} unreadable", limit - n),
    }
}

/// Errors from [`ManagedSession`](crate::ManagedSession).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SessionError {
    /// No slot could be acquired before the overall deadline.
    #[snafu(display("could not acquire '{target}' within {elapsed_ms}ms after {attempts} attempts"))]
    AcquireTimeout {
        /// Normalized target name.
        target: String,
        /// Acquire attempts made.
        attempts: u32,
        /// Time spent trying.
        elapsed_ms: u64,
    },

    /// Acquire failed in a way retrying cannot fix.
    #[snafu(display("lease error: {source}"))]
    Lease {
        /// The underlying error.
        source: LeaseError,
    },
}

impl From<LeaseError> for SessionError {
    fn from(source: LeaseError) -> Self {
        SessionError::Lease { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LeaseError::NoSlotAvailable {
            target: "printer".to_string(),
            limit: 2,
            unreadable: 0,
        };
        assert_eq!(err.to_string(), "no slot available on 'printer': all 2 slots are held");

        let err = LeaseError::NoSlotAvailable {
            target: "printer".to_string(),
            limit: 3,
            unreadable: 1,
        };
        assert_eq!(err.to_string(), "no slot available on 'printer': 2 of 3 slots are held, 1 unreadable");

        let err = LeaseError::NoSlotAvailable {
            target: "printer".to_string(),
            limit: 2,
            unreadable: 2,
        };
        assert_eq!(err.to_string(), "no slot available on 'printer': all 2 slots are unreadable");

        let err = SessionError::AcquireTimeout {
            target: "printer".to_string(),
            attempts: 3,
            elapsed_ms: 1000,
        };
        assert_eq!(err.to_string(), "could not acquire 'printer' within 1000ms after 3 attempts");
    }

    #[test]
    fn test_retryable() {
        assert!(
            LeaseError::NoSlotAvailable {
                target: "t".into(),
                limit: 1,
                unreadable: 0,
            }
            .is_retryable()
        );
        assert!(
            LeaseError::Storage {
                key: "k".into(),
                source: StoreError::Unavailable { key: "k".into() },
            }
            .is_retryable()
        );
        assert!(!LeaseError::NoLeaseHeld { target: "t".into() }.is_retryable());
        assert!(!LeaseError::InvalidTarget { target: "".into() }.is_retryable());
        assert!(!LeaseError::InvalidToken { token: "a|b".into() }.is_retryable());
    }
}
