//! Storage backends for slot leases.
//!
//! The lease protocol needs very little from its backend: point reads, point
//! writes, deletes, and an advisory per-key lock that serializes the
//! confirm-and-write step of a slot claim. [`LeaseStore`] captures exactly
//! that surface so the protocol can run against anything that offers it.
//!
//! Two implementations ship here:
//!
//! - [`InMemoryLeaseStore`] - process-local, deterministic, used by tests and
//!   by callers that only coordinate tasks within one process
//! - [`FileLeaseStore`] - a directory on a shared filesystem, one file per key,
//!   with `flock`-style lock files so independent processes can coordinate
//!
//! The store only persists bytes. It never interprets lease records.

mod error;
mod file;
mod memory;
mod traits;

pub use error::StoreError;
pub use file::FileLeaseStore;
pub use file::FileLockGuard;
pub use memory::InMemoryLeaseStore;
pub use traits::LeaseStore;
