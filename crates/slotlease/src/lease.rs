//! Lease records and ownership tokens.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::LEASE_FIELD_SEPARATOR;
use crate::pure;

/// Opaque proof of ownership, generated fresh for every acquire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Generate a new random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing token, e.g. one handed back by a caller.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether this token can be stored in a lease record.
    pub fn is_valid(&self) -> bool {
        pure::is_valid_token(&self.0)
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lease record stored in one slot.
///
/// Persisted as `client|deadline_ms|token`. The client is informational and
/// never checked for identity; ownership is proven by the token alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Who took the lease.
    pub client: String,
    /// Absolute expiry (Unix milliseconds).
    pub deadline_ms: u64,
    /// Ownership token.
    pub token: LeaseToken,
}

impl Lease {
    /// Create a lease record. Separator characters are stripped from `client`.
    pub fn new(client: &str, deadline_ms: u64, token: LeaseToken) -> Self {
        Self {
            client: pure::sanitize_client(client),
            deadline_ms,
            token,
        }
    }

    /// Parse a persisted record.
    ///
    /// Returns `None` when the field count is wrong, the deadline is not an
    /// integer, or the token is empty. Callers treat `None` as a free slot.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.split(LEASE_FIELD_SEPARATOR).collect();
        let [client, deadline, token] = fields.as_slice() else {
            return None;
        };
        let deadline_ms = deadline.parse::<u64>().ok()?;
        if token.is_empty() {
            return None;
        }
        Some(Self {
            client: (*client).to_string(),
            deadline_ms,
            token: LeaseToken::new(*token),
        })
    }

    /// Encode for storage. Round-trips through [`Lease::parse`].
    pub fn serialize(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.client,
            self.deadline_ms,
            self.token,
            sep = LEASE_FIELD_SEPARATOR
        )
    }

    /// Check if this lease has expired at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        pure::is_lease_expired(self.deadline_ms, now_ms)
    }

    /// Check if this lease carries `token`.
    pub fn matches(&self, token: &LeaseToken) -> bool {
        self.token == *token
    }

    /// Remaining lifetime in milliseconds (0 if expired).
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        pure::remaining_ttl_ms(self.deadline_ms, now_ms)
    }
}
