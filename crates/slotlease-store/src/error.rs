//! Error types for lease store backends.

use std::path::PathBuf;

use snafu::Snafu;

/// Errors returned by a [`LeaseStore`](crate::LeaseStore) backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The key cannot be represented by this backend.
    #[snafu(display("invalid key '{key}': {reason}"))]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// Filesystem operation failed.
    #[snafu(display("i/o error on {}: {source}", path.display()))]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A blocking backend task panicked or was cancelled.
    #[snafu(display("store task failed: {source}"))]
    TaskJoin {
        /// The underlying join error.
        source: tokio::task::JoinError,
    },

    /// Backend refused the operation.
    #[snafu(display("store unavailable for key '{key}'"))]
    Unavailable {
        /// Key the operation targeted.
        key: String,
    },
}
